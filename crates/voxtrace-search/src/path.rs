//! Search results: a voxel path with its physical length and cost.

use voxtrace_core::{Calibration, Point3};

/// An ordered voxel sequence from start to goal, both inclusive.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path {
    points: Vec<Point3>,
    calibration: Calibration,
    total_cost: f64,
}

impl Path {
    pub fn new(points: Vec<Point3>, calibration: Calibration, total_cost: f64) -> Self {
        Self {
            points,
            calibration,
            total_cost,
        }
    }

    #[inline]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<Point3> {
        self.points.first().copied()
    }

    pub fn end(&self) -> Option<Point3> {
        self.points.last().copied()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Sum of the edge costs along the path.
    #[inline]
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Sum of calibrated segment lengths.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| self.calibration.distance(w[0], w[1]))
            .sum()
    }

    /// Points in physical units.
    pub fn physical_points(&self) -> Vec<[f64; 3]> {
        self.points
            .iter()
            .map(|&p| self.calibration.to_physical(p))
            .collect()
    }

    pub fn contains(&self, p: Point3) -> bool {
        self.points.contains(&p)
    }

    /// Same points, end to start. The cost is kept as is.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut points = self.points.clone();
        points.reverse();
        Self::new(points, self.calibration.clone(), self.total_cost)
    }

    /// Append `other`, dropping its first point when it repeats our last.
    pub fn append(&mut self, other: &Path) {
        let skip = usize::from(self.end().is_some() && self.end() == other.start());
        self.points.extend_from_slice(&other.points[skip..]);
        self.total_cost += other.total_cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(points: &[(i32, i32)]) -> Path {
        Path::new(
            points.iter().map(|&(x, y)| Point3::new(x, y, 0)).collect(),
            Calibration::new(0.5, 0.5, 1.0, "um").unwrap(),
            1.0,
        )
    }

    #[test]
    fn length_is_calibrated() {
        let p = line(&[(0, 0), (1, 0), (2, 1), (2, 2)]);
        assert_relative_eq!(p.length(), 0.5 + 0.5 * 2f64.sqrt() + 0.5);
        assert_eq!(p.physical_points()[2], [1.0, 0.5, 0.0]);
        assert_eq!(p.start(), Some(Point3::new(0, 0, 0)));
        assert_eq!(p.end(), Some(Point3::new(2, 2, 0)));
    }

    #[test]
    fn append_joins_shared_endpoint() {
        let mut a = line(&[(0, 0), (1, 0)]);
        let b = line(&[(1, 0), (2, 0)]);
        a.append(&b);
        assert_eq!(a.len(), 3);
        assert_relative_eq!(a.total_cost(), 2.0);
        let c = line(&[(5, 5)]);
        a.append(&c);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn reversed_keeps_length() {
        let p = line(&[(0, 0), (3, 4), (3, 5)]);
        let r = p.reversed();
        assert_eq!(r.start(), p.end());
        assert_relative_eq!(r.length(), p.length());
    }
}
