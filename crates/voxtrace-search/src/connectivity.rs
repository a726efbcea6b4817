//! Neighbourhoods used to expand a voxel.

use std::fmt;

use voxtrace_core::{Bounds, Calibration, Point3};

/// Which adjacent voxels count as neighbours.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Connectivity {
    /// Face neighbours only.
    Six,
    /// Face and edge neighbours.
    Eighteen,
    /// Every voxel of the surrounding 3×3×3 block.
    #[default]
    TwentySix,
}

impl Connectivity {
    /// Largest Manhattan length among the offsets.
    #[inline]
    const fn max_manhattan(self) -> i32 {
        match self {
            Self::Six => 1,
            Self::Eighteen => 2,
            Self::TwentySix => 3,
        }
    }

    /// Number of neighbours of an interior voxel.
    pub const fn len(self) -> usize {
        match self {
            Self::Six => 6,
            Self::Eighteen => 18,
            Self::TwentySix => 26,
        }
    }

    /// Whether the offset `d` is a neighbour step.
    #[inline]
    pub fn contains(self, d: Point3) -> bool {
        d != Point3::ZERO
            && d.chebyshev(Point3::ZERO) <= 1
            && d.manhattan(Point3::ZERO) <= self.max_manhattan()
    }

    /// Every neighbour offset, in z, y, x order.
    pub fn offsets(self) -> Vec<Point3> {
        let mut out = Vec::with_capacity(self.len());
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let d = Point3::new(dx, dy, dz);
                    if self.contains(d) {
                        out.push(d);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-connected", self.len())
    }
}

/// Neighbour offsets with their physical step lengths precomputed.
#[derive(Clone, Debug)]
pub struct NeighborTable {
    steps: Vec<(Point3, f64)>,
    buf: Vec<(Point3, f64)>,
}

impl NeighborTable {
    pub fn new(connectivity: Connectivity, calibration: &Calibration) -> Self {
        let steps: Vec<_> = connectivity
            .offsets()
            .into_iter()
            .map(|d| (d, calibration.step_length(d.x, d.y, d.z)))
            .collect();
        Self {
            buf: Vec::with_capacity(steps.len()),
            steps,
        }
    }

    /// Neighbours of `p` inside `bounds`, with the physical length of the
    /// step to each.
    pub fn around(&mut self, p: Point3, bounds: Bounds) -> &[(Point3, f64)] {
        self.buf.clear();
        for &(d, len) in &self.steps {
            let n = p + d;
            if bounds.contains(n) {
                self.buf.push((n, len));
            }
        }
        &self.buf
    }

    /// Longest single step.
    pub fn max_step(&self) -> f64 {
        self.steps.iter().map(|&(_, l)| l).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn offset_counts() {
        assert_eq!(Connectivity::Six.offsets().len(), 6);
        assert_eq!(Connectivity::Eighteen.offsets().len(), 18);
        assert_eq!(Connectivity::TwentySix.offsets().len(), 26);
        assert!(Connectivity::Six.contains(Point3::new(0, 0, -1)));
        assert!(!Connectivity::Six.contains(Point3::new(1, 1, 0)));
        assert!(Connectivity::Eighteen.contains(Point3::new(1, 1, 0)));
        assert!(!Connectivity::Eighteen.contains(Point3::new(1, 1, 1)));
        assert!(!Connectivity::TwentySix.contains(Point3::new(2, 0, 0)));
        assert!(!Connectivity::TwentySix.contains(Point3::ZERO));
    }

    #[test]
    fn table_clips_to_bounds() {
        let cal = Calibration::new(1.0, 1.0, 2.0, "um").unwrap();
        let mut t = NeighborTable::new(Connectivity::TwentySix, &cal);
        let b = Bounds::from_dims(10, 10, 1);
        // Single-slice volume: only the 8 in-plane neighbours survive.
        assert_eq!(t.around(Point3::new(5, 5, 0), b).len(), 8);
        assert_eq!(t.around(Point3::new(0, 0, 0), b).len(), 3);
        assert_relative_eq!(t.max_step(), 6f64.sqrt());
    }

    #[test]
    fn step_lengths_follow_calibration() {
        let cal = Calibration::new(0.5, 1.0, 1.0, "um").unwrap();
        let mut t = NeighborTable::new(Connectivity::Six, &cal);
        let b = Bounds::from_dims(3, 3, 3);
        let around = t.around(Point3::new(1, 1, 1), b).to_vec();
        let x_step = around
            .iter()
            .find(|(p, _)| *p == Point3::new(2, 1, 1))
            .map(|&(_, l)| l);
        assert_eq!(x_step, Some(0.5));
    }
}
