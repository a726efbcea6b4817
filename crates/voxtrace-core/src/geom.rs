//! Geometry primitives: [`Point3`] and [`Bounds`].
//!
//! Voxel coordinates are signed so that neighbour offsets can step outside a
//! volume and be rejected by [`Bounds::contains`] instead of wrapping.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

// ---------------------------------------------------------------------------
// Point3
// ---------------------------------------------------------------------------

/// A 3D integer voxel coordinate.
///
/// Points order slice-major (z, then y, then x). Searches rely on that order
/// to break exact priority ties deterministically.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point3 {
    /// Origin (0, 0, 0).
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    /// Create a new point.
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Return a point shifted by (dx, dy, dz).
    #[inline]
    pub const fn shift(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Manhattan (L1) distance.
    #[inline]
    pub fn manhattan(self, other: Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs() + (self.z - other.z).abs()
    }

    /// Chebyshev (L∞) distance.
    #[inline]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    /// Squared voxel-space Euclidean distance.
    #[inline]
    pub fn distance_sq(self, other: Self) -> i64 {
        let d = self - other;
        let (x, y, z) = (i64::from(d.x), i64::from(d.y), i64::from(d.z));
        x * x + y * y + z * z
    }
}

impl PartialOrd for Point3 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Point3 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.z
            .cmp(&other.z)
            .then(self.y.cmp(&other.y))
            .then(self.x.cmp(&other.x))
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for Point3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for Point3 {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// A half-open box \[min, max). `min` is inclusive, `max` is exclusive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min: Point3,
    pub max: Point3,
}

impl Bounds {
    /// Create bounds from two corners, canonicalised so that `min` ≤ `max`
    /// on each axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Bounds `[0, w) × [0, h) × [0, d)`.
    pub fn from_dims(width: i32, height: i32, depth: i32) -> Self {
        Self::new(
            Point3::ZERO,
            Point3::new(width.max(0), height.max(0), depth.max(0)),
        )
    }

    /// Extent along each axis.
    #[inline]
    pub fn dims(self) -> Point3 {
        self.max - self.min
    }

    #[inline]
    pub fn width(self) -> i32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(self) -> i32 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn depth(self) -> i32 {
        self.max.z - self.min.z
    }

    /// Whether the box contains no voxel.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y || self.min.z >= self.max.z
    }

    /// Number of voxels in one z-slice.
    #[inline]
    pub fn slice_len(self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.width() as usize * self.height() as usize
    }

    /// Total number of voxels.
    #[inline]
    pub fn len(self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.slice_len() as u64 * self.depth() as u64
    }

    /// Whether `p` lies inside the box.
    #[inline]
    pub fn contains(self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x < self.max.x
            && p.y >= self.min.y
            && p.y < self.max.y
            && p.z >= self.min.z
            && p.z < self.max.z
    }

    /// Flat index of `p` within its z-slice, or `None` outside the box.
    #[inline]
    pub fn slice_index(self, p: Point3) -> Option<usize> {
        if !self.contains(p) {
            return None;
        }
        let x = (p.x - self.min.x) as usize;
        let y = (p.y - self.min.y) as usize;
        Some(y * self.width() as usize + x)
    }

    /// Flat, z-major index of `p`, or `None` outside the box.
    #[inline]
    pub fn index(self, p: Point3) -> Option<usize> {
        let within = self.slice_index(p)?;
        let z = (p.z - self.min.z) as usize;
        Some(z * self.slice_len() + within)
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    pub fn point(self, idx: usize) -> Point3 {
        let w = self.width().max(1) as usize;
        let sl = self.slice_len().max(1);
        let z = idx / sl;
        let rem = idx % sl;
        Point3::new(
            (rem % w) as i32 + self.min.x,
            (rem / w) as i32 + self.min.y,
            z as i32 + self.min.z,
        )
    }

    /// Overlap of two boxes. May be empty.
    pub fn intersect(self, other: Self) -> Self {
        let min = Point3::new(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.min.z.max(other.min.z),
        );
        let max = Point3::new(
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
            self.max.z.min(other.max.z),
        );
        if min.x >= max.x || min.y >= max.y || min.z >= max.z {
            return Self::default();
        }
        Self { min, max }
    }

    /// Iterate every voxel, slice by slice, row by row.
    pub fn iter(self) -> impl Iterator<Item = Point3> {
        let len = if self.is_empty() { 0 } else { self.len() as usize };
        (0..len).map(move |i| self.point(i))
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {})", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ordering_is_slice_major() {
        let a = Point3::new(9, 9, 0);
        let b = Point3::new(0, 0, 1);
        let c = Point3::new(0, 1, 0);
        assert!(a < b);
        assert!(c < a);
        let mut v = vec![b, a, c];
        v.sort();
        assert_eq!(v, vec![c, a, b]);
    }

    #[test]
    fn point_distances() {
        let a = Point3::new(1, 2, 3);
        let b = Point3::new(4, -2, 3);
        assert_eq!(a.manhattan(b), 7);
        assert_eq!(a.chebyshev(b), 4);
        assert_eq!(a.distance_sq(b), 25);
        assert_eq!(a + b - b, a);
        assert_eq!(-a, Point3::new(-1, -2, -3));
    }

    #[test]
    fn bounds_index_round_trip() {
        let b = Bounds::new(Point3::new(2, 3, 1), Point3::new(7, 5, 4));
        assert_eq!(b.dims(), Point3::new(5, 2, 3));
        assert_eq!(b.len(), 30);
        for (i, p) in b.iter().enumerate() {
            assert!(b.contains(p));
            assert_eq!(b.index(p), Some(i));
        }
        assert_eq!(b.iter().count(), 30);
        assert_eq!(b.index(Point3::new(7, 3, 1)), None);
    }

    #[test]
    fn bounds_contains_is_half_open() {
        let b = Bounds::from_dims(4, 4, 2);
        assert!(b.contains(Point3::new(0, 0, 0)));
        assert!(b.contains(Point3::new(3, 3, 1)));
        assert!(!b.contains(Point3::new(4, 0, 0)));
        assert!(!b.contains(Point3::new(0, 0, 2)));
        assert!(!b.contains(Point3::new(-1, 0, 0)));
    }

    #[test]
    fn bounds_intersect_and_empty() {
        let a = Bounds::from_dims(10, 10, 10);
        let b = Bounds::new(Point3::new(5, 5, 5), Point3::new(20, 20, 20));
        assert_eq!(a.intersect(b), Bounds::new(Point3::new(5, 5, 5), Point3::new(10, 10, 10)));
        let far = Bounds::new(Point3::new(30, 30, 30), Point3::new(40, 40, 40));
        assert!(a.intersect(far).is_empty());
        assert_eq!(Bounds::from_dims(0, 3, 3).len(), 0);
        assert_eq!(Bounds::from_dims(0, 3, 3).iter().count(), 0);
    }
}
