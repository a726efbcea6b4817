//! Shared fixtures for the voxtrace demos.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use voxtrace_core::{Calibration, Point3, Volume, VolumeError};

pub const WIDTH: i32 = 120;
pub const HEIGHT: i32 = 80;
pub const DEPTH: i32 = 20;

/// Root of the synthetic neuron; the trunk starts here.
pub const SOMA: Point3 = Point3::new(8, 40, 10);

/// Tube centrelines as `(from, to)` pairs.
pub const BRANCHES: [(Point3, Point3); 5] = [
    (SOMA, Point3::new(112, 40, 10)),
    (Point3::new(50, 40, 10), Point3::new(100, 10, 15)),
    (Point3::new(50, 40, 10), Point3::new(95, 72, 5)),
    (Point3::new(80, 40, 10), Point3::new(110, 60, 14)),
    (Point3::new(75, 25, 12), Point3::new(60, 6, 16)),
];

/// Tip of the main trunk.
pub const TRUNK_TIP: Point3 = Point3::new(112, 40, 10);

const TUBE_RADIUS: f64 = 2.5;
const TUBE_PEAK: f32 = 180.0;
const NOISE_BASE: f32 = 20.0;

fn distance_to_segment(p: Point3, a: Point3, b: Point3) -> f64 {
    let d = [
        f64::from(b.x - a.x),
        f64::from(b.y - a.y),
        f64::from(b.z - a.z),
    ];
    let v = [
        f64::from(p.x - a.x),
        f64::from(p.y - a.y),
        f64::from(p.z - a.z),
    ];
    let len_sq: f64 = d.iter().map(|x| x * x).sum();
    let t = (v.iter().zip(&d).map(|(x, y)| x * y).sum::<f64>() / len_sq).clamp(0.0, 1.0);
    v.iter()
        .zip(&d)
        .map(|(x, y)| (x - t * y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Bright branching tubes over noise that is roughly normal, fixed by `seed`.
///
/// Voxels are 0.5 x 0.5 x 1.5 µm.
pub fn synthetic_neuron(seed: u64) -> Result<Volume, VolumeError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let cal = Calibration::new(0.5, 0.5, 1.5, "µm")?;
    Volume::from_fn(WIDTH, HEIGHT, DEPTH, cal, |p| {
        // Sum of three uniforms: mean 30, bell-shaped.
        let noise: f32 = (0..3).map(|_| rng.random_range(0.0f32..20.0)).sum();
        let r = BRANCHES
            .iter()
            .map(|&(a, b)| distance_to_segment(p, a, b))
            .fold(f64::INFINITY, f64::min);
        let signal = if r <= TUBE_RADIUS {
            TUBE_PEAK * (1.0 - 0.5 * (r / TUBE_RADIUS) as f32)
        } else {
            0.0
        };
        NOISE_BASE + noise + signal
    })
}
