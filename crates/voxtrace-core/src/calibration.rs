//! Physical voxel spacing.

use std::fmt;

use crate::error::VolumeError;
use crate::geom::Point3;

/// Anisotropic voxel spacing, in physical units per voxel along each axis.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub unit: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::isotropic(1.0)
    }
}

impl Calibration {
    /// Create a calibration. Every spacing must be finite and positive.
    pub fn new(x: f64, y: f64, z: f64, unit: impl Into<String>) -> Result<Self, VolumeError> {
        for (axis, s) in [('x', x), ('y', y), ('z', z)] {
            if !(s.is_finite() && s > 0.0) {
                return Err(VolumeError::InvalidSpacing { axis, value: s });
            }
        }
        Ok(Self {
            x,
            y,
            z,
            unit: unit.into(),
        })
    }

    /// Same spacing on every axis, unit "pixel".
    pub fn isotropic(spacing: f64) -> Self {
        Self {
            x: spacing,
            y: spacing,
            z: spacing,
            unit: "pixel".to_string(),
        }
    }

    /// Physical length of a voxel step (dx, dy, dz).
    #[inline]
    pub fn step_length(&self, dx: i32, dy: i32, dz: i32) -> f64 {
        let px = f64::from(dx) * self.x;
        let py = f64::from(dy) * self.y;
        let pz = f64::from(dz) * self.z;
        (px * px + py * py + pz * pz).sqrt()
    }

    /// Physical Euclidean distance between two voxels.
    #[inline]
    pub fn distance(&self, a: Point3, b: Point3) -> f64 {
        let d = b - a;
        self.step_length(d.x, d.y, d.z)
    }

    /// Physical position of a voxel.
    #[inline]
    pub fn to_physical(&self, p: Point3) -> [f64; 3] {
        [
            f64::from(p.x) * self.x,
            f64::from(p.y) * self.y,
            f64::from(p.z) * self.z,
        ]
    }

    /// Nearest voxel to a physical position.
    pub fn to_voxel(&self, pos: [f64; 3]) -> Point3 {
        Point3::new(
            (pos[0] / self.x).round() as i32,
            (pos[1] / self.y).round() as i32,
            (pos[2] / self.z).round() as i32,
        )
    }

    /// Smallest spacing across the three axes.
    #[inline]
    pub fn min_spacing(&self) -> f64 {
        self.x.min(self.y).min(self.z)
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} x {} {}", self.x, self.y, self.z, self.unit)
    }
}
