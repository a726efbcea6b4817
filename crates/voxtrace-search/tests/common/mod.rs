//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use voxtrace_core::{Calibration, ImageStats, Point3, Volume};
use voxtrace_search::{Reciprocal, Tubeness};

/// Endpoints of the ridge in [`ridge_image`].
pub const RIDGE_START: Point3 = Point3::new(33, 430, 0);
pub const RIDGE_END: Point3 = Point3::new(439, 200, 0);

/// Pixel size of [`ridge_image`], in micrometres.
pub const RIDGE_SPACING: f64 = 0.382;

pub const RIDGE_INTENSITY: f32 = 200.0;

/// Distance from `p` to the segment `a`–`b`, in voxels.
pub fn distance_to_segment(p: Point3, a: Point3, b: Point3) -> f64 {
    let (px, py) = (f64::from(p.x - a.x), f64::from(p.y - a.y));
    let (dx, dy) = (f64::from(b.x - a.x), f64::from(b.y - a.y));
    let t = ((px * dx + py * dy) / (dx * dx + dy * dy)).clamp(0.0, 1.0);
    let (ex, ey) = (px - t * dx, py - t * dy);
    (ex * ex + ey * ey).sqrt()
}

/// A 2D image with a straight bright ridge, three voxels in radius, from
/// [`RIDGE_START`] to [`RIDGE_END`] over uniform noise in 100..160.
///
/// The cheapest path stays on the ridge and takes a shortest 8-connected
/// route: 176 axial and 230 diagonal steps, 501.27 pixels, 191.49 µm.
pub fn ridge_image(seed: u64) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let cal = Calibration::new(RIDGE_SPACING, RIDGE_SPACING, 1.0, "µm").unwrap();
    Volume::from_fn(450, 440, 1, cal, |p| {
        if distance_to_segment(p, RIDGE_START, RIDGE_END) <= 3.0 {
            RIDGE_INTENSITY
        } else {
            rng.random_range(100.0f32..160.0)
        }
    })
    .unwrap()
}

/// Tubeness of `v` at 0.75 µm, about two ridge pixels.
pub fn tubeness_of(v: &Volume) -> Volume {
    Tubeness::new([0.75]).unwrap().apply(v).unwrap()
}

pub fn reciprocal_for(v: &Volume) -> Reciprocal {
    let stats = ImageStats::compute(v);
    Reciprocal::new(stats.min, stats.max)
}

/// Uniform noise in `lo..hi`.
pub fn noise_volume(seed: u64, w: i32, h: i32, d: i32, lo: f32, hi: f32) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    Volume::from_fn(w, h, d, Calibration::default(), |_| rng.random_range(lo..hi)).unwrap()
}

/// Random in-bounds point pairs at least `min_apart` voxels apart
/// (Chebyshev).
pub fn endpoint_pairs(seed: u64, v: &Volume, n: usize, min_apart: i32) -> Vec<(Point3, Point3)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let pick = |rng: &mut StdRng| {
        Point3::new(
            rng.random_range(0..v.width()),
            rng.random_range(0..v.height()),
            rng.random_range(0..v.depth()),
        )
    };
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        let (a, b) = (pick(&mut rng), pick(&mut rng));
        if a.chebyshev(b) >= min_apart {
            out.push((a, b));
        }
    }
    out
}
