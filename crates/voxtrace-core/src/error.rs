//! Errors raised while building volumes and calibrations.

/// Invalid volume construction input.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VolumeError {
    /// Voxel spacing was zero, negative or not finite.
    #[error("invalid voxel spacing {value} along {axis}")]
    InvalidSpacing { axis: char, value: f64 },

    /// A raw sample buffer does not match the declared dimensions.
    #[error("expected {expected} samples for the declared dimensions, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Negative or overflowing dimensions.
    #[error("invalid volume dimensions {width} x {height} x {depth}")]
    InvalidDimensions { width: i32, height: i32, depth: i32 },
}
