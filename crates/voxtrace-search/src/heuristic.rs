//! Remaining-distance estimates for best-first search.
//!
//! A [`Heuristic`] returns a calibrated *distance*. The search scales it by
//! the active cost's [`min_step_cost`](crate::Cost::min_step_cost), which turns
//! a straight-line distance into a lower bound on the remaining cost.

use std::fmt;

use voxtrace_core::{Calibration, Point3};

/// Lower-bound distance estimate between two voxels.
pub trait Heuristic: Send + Sync + fmt::Debug {
    /// Estimated physical distance from `from` to `to`. Must never exceed the
    /// length of any voxel path between them.
    fn estimate(&self, from: Point3, to: Point3, calibration: &Calibration) -> f64;
}

impl<H: Heuristic + ?Sized> Heuristic for Box<H> {
    fn estimate(&self, from: Point3, to: Point3, calibration: &Calibration) -> f64 {
        (**self).estimate(from, to, calibration)
    }
}

impl<H: Heuristic + ?Sized> Heuristic for &H {
    fn estimate(&self, from: Point3, to: Point3, calibration: &Calibration) -> f64 {
        (**self).estimate(from, to, calibration)
    }
}

/// Calibrated straight-line distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Euclidean;

impl Heuristic for Euclidean {
    #[inline]
    fn estimate(&self, from: Point3, to: Point3, calibration: &Calibration) -> f64 {
        calibration.distance(from, to)
    }
}

/// Always zero: best-first search degenerates into uniform-cost search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dijkstra;

impl Heuristic for Dijkstra {
    #[inline]
    fn estimate(&self, _from: Point3, _to: Point3, _calibration: &Calibration) -> f64 {
        0.0
    }
}

/// Selects a heuristic by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeuristicKind {
    #[default]
    Euclidean,
    Dijkstra,
}

impl HeuristicKind {
    pub fn build(self) -> Box<dyn Heuristic> {
        match self {
            Self::Euclidean => Box::new(Euclidean),
            Self::Dijkstra => Box::new(Dijkstra),
        }
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => f.write_str("euclidean"),
            Self::Dijkstra => f.write_str("dijkstra"),
        }
    }
}
