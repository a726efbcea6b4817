//! **voxtrace-core** — voxel geometry and intensity volumes.
//!
//! This crate provides the foundational types shared by the voxtrace search
//! engine: integer voxel coordinates and boxes, physical calibration, the
//! [`IntensitySource`] view over a scalar volume, a dense [`Volume`], and
//! whole-volume [`ImageStats`].

pub mod calibration;
pub mod error;
pub mod geom;
pub mod stats;
pub mod volume;

pub use calibration::Calibration;
pub use error::VolumeError;
pub use geom::{Bounds, Point3};
pub use stats::{ImageStats, percentile};
pub use volume::{IntensitySource, Volume};
