//! Hessian tubeness: a field that is bright on the centrelines of line-like
//! structures and near zero on flat or blob-like background.
//!
//! At each scale the source is smoothed with a Gaussian whose per-axis width
//! is the scale divided by the voxel spacing. The Hessian's eigenvalues then
//! rate each voxel:
//!
//! - in 2D the eigenvalue of largest magnitude must be negative, and the
//!   measure is its magnitude;
//! - in 3D the two eigenvalues of largest magnitude must both be negative,
//!   and the measure is the square root of their product.
//!
//! Measures are multiplied by the squared mean width so scales compare, and
//! the largest response over all scales is kept.

use rayon::prelude::*;
use voxtrace_core::{IntensitySource, Point3, Volume};

use crate::error::{Result, SearchError};

/// Multi-scale tubeness filter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tubeness {
    scales: Vec<f64>,
}

impl Tubeness {
    /// Scales are Gaussian widths in the source's physical units.
    pub fn new(scales: impl Into<Vec<f64>>) -> Result<Self> {
        let scales = scales.into();
        if scales.is_empty() {
            return Err(SearchError::InvalidConfig(
                "tubeness needs at least one scale".into(),
            ));
        }
        if let Some(s) = scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(SearchError::InvalidConfig(format!(
                "tubeness scale must be finite and positive, got {s}"
            )));
        }
        Ok(Self { scales })
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Filter the whole source into a new volume with the same calibration.
    ///
    /// The source's bounds must start at the origin.
    pub fn apply<S: IntensitySource + ?Sized>(&self, source: &S) -> Result<Volume> {
        let bounds = source.bounds();
        if bounds.min != Point3::ZERO {
            return Err(SearchError::InvalidConfig(format!(
                "tubeness needs a source anchored at the origin, got {bounds}"
            )));
        }
        let cal = source.calibration().clone();
        let (w, h, d) = (bounds.width(), bounds.height(), bounds.depth());
        let grid = Grid::new(w as usize, h as usize, d as usize);
        let data: Vec<f64> = bounds.iter().map(|p| source.value(p)).collect();

        let mut best = vec![0.0f64; data.len()];
        for &scale in &self.scales {
            let sigma = [scale / cal.x, scale / cal.y, scale / cal.z];
            let response = grid.tubeness_at(&data, sigma);
            best.par_iter_mut()
                .zip(&response)
                .for_each(|(b, r)| *b = b.max(*r));
            log::debug!("tubeness at scale {scale} done");
        }

        let samples = best.into_iter().map(|v| v as f32).collect();
        Volume::from_vec(w, h, d, cal, samples)
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Dense grid helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct Grid {
    w: usize,
    h: usize,
    d: usize,
}

impl Grid {
    fn new(w: usize, h: usize, d: usize) -> Self {
        Self { w, h, d }
    }

    fn is_planar(self) -> bool {
        self.d == 1
    }

    #[inline]
    fn index(self, x: usize, y: usize, z: usize) -> usize {
        (z * self.h + y) * self.w + x
    }

    /// Neighbour of `i` (0-based, `< n`) offset by `k`, replicated at the
    /// borders.
    #[inline]
    fn clamp(i: usize, k: isize, n: usize) -> usize {
        (i as isize + k).clamp(0, n as isize - 1) as usize
    }

    fn tubeness_at(self, data: &[f64], sigma: [f64; 3]) -> Vec<f64> {
        let axes = if self.is_planar() { 2 } else { 3 };
        let mut smoothed = data.to_vec();
        for (axis, &s) in sigma.iter().enumerate().take(axes) {
            smoothed = self.blur_axis(&smoothed, axis, &gaussian_kernel(s));
        }
        let mean_sigma = sigma[..axes].iter().sum::<f64>() / axes as f64;
        let norm = mean_sigma * mean_sigma;

        let plane = self.w * self.h;
        let mut out = vec![0.0; smoothed.len()];
        if plane == 0 {
            return out;
        }
        out.par_chunks_mut(plane).enumerate().for_each(|(z, slice)| {
            for y in 0..self.h {
                for x in 0..self.w {
                    let hess = self.hessian(&smoothed, x, y, z);
                    slice[y * self.w + x] = if self.is_planar() {
                        norm * planar_measure(hess)
                    } else {
                        norm * volume_measure(hess)
                    };
                }
            }
        });
        out
    }

    /// One pass of a separable convolution along `axis`.
    fn blur_axis(self, data: &[f64], axis: usize, kernel: &[f64]) -> Vec<f64> {
        let radius = (kernel.len() / 2) as isize;
        let plane = self.w * self.h;
        let mut out = vec![0.0; data.len()];
        if plane == 0 {
            return out;
        }
        out.par_chunks_mut(plane).enumerate().for_each(|(z, slice)| {
            for y in 0..self.h {
                for x in 0..self.w {
                    let mut acc = 0.0;
                    for (j, weight) in kernel.iter().enumerate() {
                        let k = j as isize - radius;
                        let i = match axis {
                            0 => self.index(Self::clamp(x, k, self.w), y, z),
                            1 => self.index(x, Self::clamp(y, k, self.h), z),
                            _ => self.index(x, y, Self::clamp(z, k, self.d)),
                        };
                        acc += weight * data[i];
                    }
                    slice[y * self.w + x] = acc;
                }
            }
        });
        out
    }

    /// Second derivatives by central differences:
    /// `[xx, yy, zz, xy, xz, yz]`.
    fn hessian(self, f: &[f64], x: usize, y: usize, z: usize) -> [f64; 6] {
        let at = |dx: isize, dy: isize, dz: isize| {
            f[self.index(
                Self::clamp(x, dx, self.w),
                Self::clamp(y, dy, self.h),
                Self::clamp(z, dz, self.d),
            )]
        };
        let c = at(0, 0, 0);
        let xx = at(1, 0, 0) - 2.0 * c + at(-1, 0, 0);
        let yy = at(0, 1, 0) - 2.0 * c + at(0, -1, 0);
        let xy = (at(1, 1, 0) - at(1, -1, 0) - at(-1, 1, 0) + at(-1, -1, 0)) / 4.0;
        if self.is_planar() {
            return [xx, yy, 0.0, xy, 0.0, 0.0];
        }
        let zz = at(0, 0, 1) - 2.0 * c + at(0, 0, -1);
        let xz = (at(1, 0, 1) - at(1, 0, -1) - at(-1, 0, 1) + at(-1, 0, -1)) / 4.0;
        let yz = (at(0, 1, 1) - at(0, 1, -1) - at(0, -1, 1) + at(0, -1, -1)) / 4.0;
        [xx, yy, zz, xy, xz, yz]
    }
}

/// Normalised Gaussian of radius `ceil(3σ)`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil() as isize;
    if radius < 1 {
        return vec![1.0];
    }
    let two_var = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / two_var).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

// ---------------------------------------------------------------------------
// Eigenvalues
// ---------------------------------------------------------------------------

/// Eigenvalues of `[[a, b], [b, d]]`, ascending.
fn eigenvalues_2x2(a: f64, b: f64, d: f64) -> [f64; 2] {
    let mean = 0.5 * (a + d);
    let r = (0.25 * (a - d) * (a - d) + b * b).sqrt();
    [mean - r, mean + r]
}

/// Eigenvalues of a symmetric 3x3 matrix given as `[xx, yy, zz, xy, xz, yz]`,
/// ascending. Closed form via the trigonometric solution of the
/// characteristic cubic.
fn eigenvalues_3x3(m: [f64; 6]) -> [f64; 3] {
    let [a, d, f, b, c, e] = m;
    let p1 = b * b + c * c + e * e;
    if p1 == 0.0 {
        let mut diag = [a, d, f];
        diag.sort_by(f64::total_cmp);
        return diag;
    }
    let q = (a + d + f) / 3.0;
    let p2 = (a - q).powi(2) + (d - q).powi(2) + (f - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let (ba, bd, bf) = ((a - q) / p, (d - q) / p, (f - q) / p);
    let (bb, bc, be) = (b / p, c / p, e / p);
    let det = ba * (bd * bf - be * be) - bb * (bb * bf - be * bc) + bc * (bb * be - bd * bc);
    let phi = (det / 2.0).clamp(-1.0, 1.0).acos() / 3.0;
    let hi = q + 2.0 * p * phi.cos();
    let lo = q + 2.0 * p * (phi + 2.0 * std::f64::consts::FRAC_PI_3).cos();
    [lo, 3.0 * q - hi - lo, hi]
}

fn planar_measure(h: [f64; 6]) -> f64 {
    let [lo, hi] = eigenvalues_2x2(h[0], h[3], h[1]);
    let strongest = if hi.abs() > lo.abs() { hi } else { lo };
    if strongest < 0.0 { -strongest } else { 0.0 }
}

fn volume_measure(h: [f64; 6]) -> f64 {
    let mut e = eigenvalues_3x3(h);
    e.sort_by(|a, b| a.abs().total_cmp(&b.abs()));
    if e[1] < 0.0 && e[2] < 0.0 {
        (e[1] * e[2]).sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use voxtrace_core::Calibration;

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(1.5);
        assert_eq!(k.len(), 11);
        assert_relative_eq!(k.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(k[0], k[10]);
        assert!(k[5] > k[4]);
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn eigenvalues_of_known_matrices() {
        assert_eq!(eigenvalues_2x2(3.0, 0.0, -1.0), [-1.0, 3.0]);
        let [lo, hi] = eigenvalues_2x2(2.0, 1.0, 2.0);
        assert_relative_eq!(lo, 1.0);
        assert_relative_eq!(hi, 3.0);

        assert_eq!(eigenvalues_3x3([2.0, -5.0, 1.0, 0.0, 0.0, 0.0]), [-5.0, 1.0, 2.0]);
        // [[2,1,0],[1,2,0],[0,0,5]] has eigenvalues 1, 3, 5.
        let e = eigenvalues_3x3([2.0, 2.0, 5.0, 1.0, 0.0, 0.0]);
        for (got, want) in e.iter().zip([1.0, 3.0, 5.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
        // [[4,1,1],[1,4,1],[1,1,4]] has eigenvalues 3, 3, 6.
        let e = eigenvalues_3x3([4.0, 4.0, 4.0, 1.0, 1.0, 1.0]);
        for (got, want) in e.iter().zip([3.0, 3.0, 6.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn measures_keep_only_bright_lines() {
        // Bright line along x: strong negative curvature across it.
        assert_relative_eq!(planar_measure([0.0, -4.0, 0.0, 0.0, 0.0, 0.0]), 4.0);
        // Dark line.
        assert_eq!(planar_measure([0.0, 4.0, 0.0, 0.0, 0.0, 0.0]), 0.0);
        // Bright tube along z in 3D.
        assert_relative_eq!(volume_measure([-4.0, -9.0, 0.1, 0.0, 0.0, 0.0]), 6.0);
        // A bright sheet has only one strong negative eigenvalue.
        assert_eq!(volume_measure([-4.0, 0.0, 0.0, 0.0, 0.0, 0.0]), 0.0);
    }

    fn bar_2d() -> Volume {
        Volume::from_fn(40, 31, 1, Calibration::default(), |p| {
            if (p.y - 15).abs() <= 2 { 100.0 } else { 10.0 }
        })
        .unwrap()
    }

    #[test]
    fn planar_bar_peaks_on_its_centreline() {
        let t = Tubeness::new([2.5]).unwrap().apply(&bar_2d()).unwrap();
        let centre = t.value(Point3::new(20, 15, 0));
        assert!(centre > 20.0, "centre {centre}");
        assert!(t.value(Point3::new(20, 16, 0)) < centre);
        // Flat background far from the bar.
        assert!(t.value(Point3::new(20, 2, 0)).abs() < 1e-6);
        assert!(t.value(Point3::new(20, 28, 0)).abs() < 1e-6);
        assert!(t.as_slice().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn tube_in_volume_beats_flat_background() {
        let v = Volume::from_fn(16, 16, 24, Calibration::new(1.0, 1.0, 1.0, "µm").unwrap(), |p| {
            let r2 = (p.x - 8).pow(2) + (p.y - 8).pow(2);
            if r2 <= 4 { 200.0 } else { 20.0 }
        })
        .unwrap();
        let t = Tubeness::new([1.0, 2.0]).unwrap().apply(&v).unwrap();
        let axis = t.value(Point3::new(8, 8, 12));
        assert!(axis > 10.0, "axis {axis}");
        assert!(t.value(Point3::new(1, 1, 12)) < axis * 0.01);
        assert_eq!(t.calibration().unit, "µm");
    }

    #[test]
    fn larger_scale_wins_for_wide_bars() {
        let v = bar_2d();
        let small = Tubeness::new([0.5]).unwrap().apply(&v).unwrap();
        let both = Tubeness::new([0.5, 2.0]).unwrap().apply(&v).unwrap();
        let p = Point3::new(20, 15, 0);
        assert!(both.value(p) >= small.value(p));
    }

    #[test]
    fn scales_are_validated() {
        assert!(Tubeness::new(Vec::<f64>::new()).is_err());
        assert!(Tubeness::new([0.0]).is_err());
        assert!(Tubeness::new([f64::NAN]).is_err());
        assert_eq!(Tubeness::new([0.75]).unwrap().scales(), &[0.75]);
    }
}
