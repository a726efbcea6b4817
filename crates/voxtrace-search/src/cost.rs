//! Intensity-to-cost functions.
//!
//! A [`Cost`] turns the intensity of the voxel being entered into a per-unit-
//! length cost. Searches multiply it by the physical step length and clamp it
//! from below by [`Cost::min_step_cost`], so no edge is ever free.

use std::fmt;

use voxtrace_core::ImageStats;

/// Maps an intensity to a non-negative per-unit-length cost.
pub trait Cost: Send + Sync + fmt::Debug {
    /// Cost per unit length of entering a voxel with intensity `value`.
    fn cost_moving_to(&self, value: f64) -> f64;

    /// Strictly positive lower bound of [`cost_moving_to`](Self::cost_moving_to)
    /// over the image's intensity range. Scales the admissible heuristic.
    fn min_step_cost(&self) -> f64;
}

impl<C: Cost + ?Sized> Cost for Box<C> {
    fn cost_moving_to(&self, value: f64) -> f64 {
        (**self).cost_moving_to(value)
    }

    fn min_step_cost(&self) -> f64 {
        (**self).min_step_cost()
    }
}

impl<C: Cost + ?Sized> Cost for &C {
    fn cost_moving_to(&self, value: f64) -> f64 {
        (**self).cost_moving_to(value)
    }

    fn min_step_cost(&self) -> f64 {
        (**self).min_step_cost()
    }
}

/// Rescaled intensities live in 0..=255.
const RESCALED_MAX: f64 = 255.0;

/// Smallest positive subnormal `f32`.
const F32_TINY: f32 = f32::from_bits(1);

/// Stand-in for non-positive rescaled intensities in [`Reciprocal`].
const RECIPROCAL_FUDGE: f64 = RESCALED_MAX * 0.5 * (F32_TINY as f64 / f32::MAX as f64);

/// Added to the [`OneMinusErf`] minimum so it never reaches zero.
const ERF_STEP_COST_LOWER_BOUND: f64 = 1e-60;

fn rescale(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span <= 0.0 {
        return RESCALED_MAX;
    }
    RESCALED_MAX * (value - min) / span
}

// ---------------------------------------------------------------------------
// Reciprocal
// ---------------------------------------------------------------------------

/// `1 / v'` where `v'` is the intensity rescaled to 0..=255.
///
/// Bright voxels are cheap, dark voxels very expensive.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reciprocal {
    min: f64,
    max: f64,
}

impl Reciprocal {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Cost for Reciprocal {
    fn cost_moving_to(&self, value: f64) -> f64 {
        let mut v = rescale(value, self.min, self.max);
        if v <= 0.0 {
            v = RECIPROCAL_FUDGE;
        } else if v > RESCALED_MAX {
            v = RESCALED_MAX;
        }
        1.0 / v
    }

    fn min_step_cost(&self) -> f64 {
        1.0 / RESCALED_MAX
    }
}

// ---------------------------------------------------------------------------
// Difference / DifferenceSq
// ---------------------------------------------------------------------------

/// `256 - v'`: linear in the distance from the brightest intensity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Difference {
    min: f64,
    max: f64,
}

impl Difference {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Cost for Difference {
    fn cost_moving_to(&self, value: f64) -> f64 {
        let v = rescale(value, self.min, self.max).clamp(0.0, RESCALED_MAX);
        RESCALED_MAX + 1.0 - v
    }

    fn min_step_cost(&self) -> f64 {
        1.0
    }
}

/// `(256 - v')²`: like [`Difference`] but punishes dim voxels harder.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DifferenceSq {
    min: f64,
    max: f64,
}

impl DifferenceSq {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Cost for DifferenceSq {
    fn cost_moving_to(&self, value: f64) -> f64 {
        let d = Difference::new(self.min, self.max).cost_moving_to(value);
        d * d
    }

    fn min_step_cost(&self) -> f64 {
        1.0
    }
}

// ---------------------------------------------------------------------------
// OneMinusErf
// ---------------------------------------------------------------------------

/// `erfc(z_fudge · (v - mean) / std_dev)`: a probabilistic cost that treats
/// an intensity's z-score as evidence of foreground.
///
/// A `z_fudge` below 1 separates very bright voxels better at the price of a
/// wider search.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OneMinusErf {
    max: f64,
    mean: f64,
    std_dev: f64,
    z_fudge: f64,
    min_step: f64,
}

impl OneMinusErf {
    /// A non-positive `std_dev` is treated as 1.
    pub fn new(max: f64, mean: f64, std_dev: f64) -> Self {
        let std_dev = if std_dev > 0.0 { std_dev } else { 1.0 };
        let mut c = Self {
            max,
            mean,
            std_dev,
            z_fudge: 1.0,
            min_step: 0.0,
        };
        c.min_step = c.compute_min_step();
        c
    }

    /// Builder form of [`set_z_fudge`](Self::set_z_fudge).
    #[must_use]
    pub fn with_z_fudge(mut self, z_fudge: f64) -> Self {
        self.set_z_fudge(z_fudge);
        self
    }

    /// Scale the z-score; recomputes the minimum step cost.
    pub fn set_z_fudge(&mut self, z_fudge: f64) {
        self.z_fudge = z_fudge;
        self.min_step = self.compute_min_step();
    }

    pub fn z_fudge(&self) -> f64 {
        self.z_fudge
    }

    fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }

    fn compute_min_step(&self) -> f64 {
        libm::erfc(self.z_fudge * self.z_score(self.max)) + ERF_STEP_COST_LOWER_BOUND
    }
}

impl Cost for OneMinusErf {
    fn cost_moving_to(&self, value: f64) -> f64 {
        libm::erfc(self.z_fudge * self.z_score(value))
    }

    fn min_step_cost(&self) -> f64 {
        self.min_step
    }
}

// ---------------------------------------------------------------------------
// TubenessCost
// ---------------------------------------------------------------------------

/// Stand-in for a zero tubeness measure.
const TUBENESS_ZERO_MEASURE: f64 = 0.2;

/// Largest scaled measure; brighter values cost the same.
const TUBENESS_MAX_MEASURE: f64 = 256.0;

/// `1 / (m · multiplier)` over a [`Tubeness`](crate::Tubeness) field, with
/// the scaled measure capped at 256.
///
/// Not derived from image statistics: the measure is already a
/// foreground score.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TubenessCost {
    multiplier: f64,
}

impl TubenessCost {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl Default for TubenessCost {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Cost for TubenessCost {
    fn cost_moving_to(&self, value: f64) -> f64 {
        let measure = if value > 0.0 { value } else { TUBENESS_ZERO_MEASURE };
        let scaled = (measure * self.multiplier).min(TUBENESS_MAX_MEASURE);
        if scaled > 0.0 { 1.0 / scaled } else { 1.0 / TUBENESS_ZERO_MEASURE }
    }

    fn min_step_cost(&self) -> f64 {
        1.0 / 60.0
    }
}

// ---------------------------------------------------------------------------
// CostKind
// ---------------------------------------------------------------------------

/// Selects and builds a cost function from image statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CostKind {
    #[default]
    Reciprocal,
    Difference,
    DifferenceSquared,
    /// [`OneMinusErf`] with the default z-fudge.
    Probability,
}

impl CostKind {
    /// Construct the cost for an image with the given statistics.
    pub fn build(self, stats: &ImageStats) -> Box<dyn Cost> {
        match self {
            Self::Reciprocal => Box::new(Reciprocal::new(stats.min, stats.max)),
            Self::Difference => Box::new(Difference::new(stats.min, stats.max)),
            Self::DifferenceSquared => Box::new(DifferenceSq::new(stats.min, stats.max)),
            Self::Probability => Box::new(OneMinusErf::new(stats.max, stats.mean, stats.std_dev)),
        }
    }
}

impl fmt::Display for CostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reciprocal => "reciprocal",
            Self::Difference => "difference",
            Self::DifferenceSquared => "difference squared",
            Self::Probability => "1 - erf",
        };
        f.write_str(name)
    }
}
