//! Error types for search operations.
//!
//! Only conditions that abort a call are errors. A search that ends without a
//! path (exhausted, timed out, cancelled) finishes normally and reports a
//! [`SearchStatus::Failed`](crate::SearchStatus::Failed) outcome instead.

use std::io;

use voxtrace_core::{Bounds, Point3};

/// Errors that abort a search call.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SearchError {
    /// A start, goal or seed coordinate lies outside the volume.
    #[error("coordinate {point} is outside the volume bounds {bounds}")]
    InvalidCoordinate {
        /// The offending coordinate.
        point: Point3,
        /// The volume extent it was checked against.
        bounds: Bounds,
    },

    /// Paging a slice to or from temporary storage failed.
    #[error("storage I/O error: {0}")]
    StorageIo(#[from] io::Error),

    /// A paged slice could not be decoded.
    #[error("corrupt page for slice {z}: {reason}")]
    CorruptPage {
        /// The slice whose page failed to decode.
        z: i32,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `run` was called on a search that already left the ready state.
    #[error("search has already been started")]
    AlreadyStarted,
}

impl SearchError {
    /// Whether this error rejects an input coordinate.
    #[must_use]
    pub const fn is_invalid_coordinate(&self) -> bool {
        matches!(self, Self::InvalidCoordinate { .. })
    }

    /// Whether this error comes from the storage layer.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::StorageIo(_) | Self::CorruptPage { .. })
    }

    pub(crate) fn invalid_coordinate(point: Point3, bounds: Bounds) -> Self {
        Self::InvalidCoordinate { point, bounds }
    }
}

/// Result alias for search operations.
pub type Result<T, E = SearchError> = std::result::Result<T, E>;
