//! Scalar intensity volumes.
//!
//! [`IntensitySource`] is the read-only view every search consumes. [`Volume`]
//! is the dense in-memory implementation; callers with their own image
//! containers implement the trait directly instead of copying into a
//! `Volume`.

use crate::calibration::Calibration;
use crate::error::VolumeError;
use crate::geom::{Bounds, Point3};

// ---------------------------------------------------------------------------
// IntensitySource
// ---------------------------------------------------------------------------

/// Read-only access to a calibrated scalar volume.
///
/// `value` is only called with points inside [`bounds`](Self::bounds).
pub trait IntensitySource: Send + Sync {
    /// Voxel extent of the volume.
    fn bounds(&self) -> Bounds;

    /// Physical voxel spacing.
    fn calibration(&self) -> &Calibration;

    /// Intensity at `p`.
    fn value(&self, p: Point3) -> f64;

    /// Intensity at `p`, or `None` outside the volume.
    fn try_value(&self, p: Point3) -> Option<f64> {
        self.bounds().contains(p).then(|| self.value(p))
    }
}

impl<T: IntensitySource + ?Sized> IntensitySource for &T {
    fn bounds(&self) -> Bounds {
        (**self).bounds()
    }

    fn calibration(&self) -> &Calibration {
        (**self).calibration()
    }

    fn value(&self, p: Point3) -> f64 {
        (**self).value(p)
    }
}

// ---------------------------------------------------------------------------
// Volume
// ---------------------------------------------------------------------------

/// A dense `f32` volume stored slice by slice, row by row.
///
/// 2D images are volumes of depth 1.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Volume {
    bounds: Bounds,
    calibration: Calibration,
    data: Vec<f32>,
}

impl Volume {
    /// Create a zero-filled volume.
    pub fn new(
        width: i32,
        height: i32,
        depth: i32,
        calibration: Calibration,
    ) -> Result<Self, VolumeError> {
        let bounds = checked_bounds(width, height, depth)?;
        Ok(Self {
            bounds,
            calibration,
            data: vec![0.0; bounds.len() as usize],
        })
    }

    /// Wrap an existing sample buffer laid out z-major, then y, then x.
    pub fn from_vec(
        width: i32,
        height: i32,
        depth: i32,
        calibration: Calibration,
        data: Vec<f32>,
    ) -> Result<Self, VolumeError> {
        let bounds = checked_bounds(width, height, depth)?;
        let expected = bounds.len() as usize;
        if data.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            bounds,
            calibration,
            data,
        })
    }

    /// Build a volume by evaluating `f` at every voxel.
    pub fn from_fn(
        width: i32,
        height: i32,
        depth: i32,
        calibration: Calibration,
        mut f: impl FnMut(Point3) -> f32,
    ) -> Result<Self, VolumeError> {
        let bounds = checked_bounds(width, height, depth)?;
        let data = bounds.iter().map(&mut f).collect();
        Ok(Self {
            bounds,
            calibration,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.bounds.width()
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.bounds.height()
    }

    #[inline]
    pub fn depth(&self) -> i32 {
        self.bounds.depth()
    }

    /// Replace the calibration.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Sample at `p`, or `None` outside the volume.
    #[inline]
    pub fn get(&self, p: Point3) -> Option<f32> {
        self.bounds.index(p).map(|i| self.data[i])
    }

    /// Overwrite the sample at `p`. Returns `false` outside the volume.
    #[inline]
    pub fn set(&mut self, p: Point3, v: f32) -> bool {
        match self.bounds.index(p) {
            Some(i) => {
                self.data[i] = v;
                true
            }
            None => false,
        }
    }

    /// Set every sample to `v`.
    pub fn fill(&mut self, v: f32) {
        self.data.fill(v);
    }

    /// Apply `f` to every sample in place.
    pub fn map_values(&mut self, mut f: impl FnMut(f32) -> f32) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }

    /// The samples of one z-slice, or an empty slice outside the volume.
    pub fn slice_values(&self, z: i32) -> &[f32] {
        if z < self.bounds.min.z || z >= self.bounds.max.z {
            return &[];
        }
        let sl = self.bounds.slice_len();
        let start = (z - self.bounds.min.z) as usize * sl;
        &self.data[start..start + sl]
    }

    /// All samples.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl IntensitySource for Volume {
    #[inline]
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[inline]
    fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[inline]
    fn value(&self, p: Point3) -> f64 {
        self.get(p).map_or(0.0, f64::from)
    }
}

fn checked_bounds(width: i32, height: i32, depth: i32) -> Result<Bounds, VolumeError> {
    let invalid = VolumeError::InvalidDimensions {
        width,
        height,
        depth,
    };
    if width < 0 || height < 0 || depth < 0 {
        return Err(invalid);
    }
    let total = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(depth as usize));
    match total {
        Some(_) => Ok(Bounds::from_dims(width, height, depth)),
        None => Err(invalid),
    }
}
