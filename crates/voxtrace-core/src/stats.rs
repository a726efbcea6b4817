//! Whole-volume intensity statistics.

use crate::volume::IntensitySource;

/// Summary statistics over every voxel of a source.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl ImageStats {
    /// Statistics from explicit values, for callers that already know them.
    pub const fn new(min: f64, max: f64, mean: f64, std_dev: f64) -> Self {
        Self {
            min,
            max,
            mean,
            std_dev,
        }
    }

    /// Single pass over the source (Welford's running variance).
    ///
    /// An empty source yields all zeros.
    pub fn compute<S: IntensitySource + ?Sized>(source: &S) -> Self {
        let mut n = 0u64;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for p in source.bounds().iter() {
            let v = source.value(p);
            n += 1;
            min = min.min(v);
            max = max.max(v);
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }
        if n == 0 {
            return Self::new(0.0, 0.0, 0.0, 0.0);
        }
        Self::new(min, max, mean, (m2 / n as f64).sqrt())
    }

    /// `max - min`.
    #[inline]
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Histogram bins per refinement pass of [`percentile`].
const PERCENTILE_BINS: usize = 1024;

/// A bin holding at most this many samples is resolved by selection.
const PERCENTILE_EXACT_LIMIT: u64 = 1 << 16;

/// Nearest-rank percentile (`q` in 0..=100) of every sample in the source.
///
/// Streams the source instead of copying it: each pass histograms the
/// samples inside the current value range and narrows the range to the bin
/// holding the wanted rank, until that bin is small enough to select from or
/// holds a single value. The result is exact.
///
/// Returns `None` for an empty source.
pub fn percentile<S: IntensitySource + ?Sized>(source: &S, q: f64) -> Option<f64> {
    let bounds = source.bounds();
    let n = bounds.len();
    if n == 0 {
        return None;
    }
    let q = q.clamp(0.0, 100.0);
    let rank = ((q / 100.0) * n as f64).ceil() as u64;
    // 0-based rank among all samples.
    let mut k = rank.saturating_sub(1).min(n - 1);

    let samples = || bounds.iter().map(|p| source.value(p));
    let (mut lo, mut hi) = samples().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let mut count = n;

    loop {
        if lo >= hi {
            return Some(lo);
        }
        if count <= PERCENTILE_EXACT_LIMIT {
            let mut values: Vec<f64> = samples().filter(|v| (lo..=hi).contains(v)).collect();
            let k = (k as usize).min(values.len().saturating_sub(1));
            let (_, v, _) = values.select_nth_unstable_by(k, f64::total_cmp);
            return Some(*v);
        }

        let width = (hi - lo) / PERCENTILE_BINS as f64;
        let bin_of = |v: f64| (((v - lo) / width) as usize).min(PERCENTILE_BINS - 1);
        let mut bins = vec![(0u64, f64::INFINITY, f64::NEG_INFINITY); PERCENTILE_BINS];
        for v in samples().filter(|v| (lo..=hi).contains(v)) {
            let bin = &mut bins[bin_of(v)];
            bin.0 += 1;
            bin.1 = bin.1.min(v);
            bin.2 = bin.2.max(v);
        }

        let mut below = 0u64;
        let Some(&(c, bin_lo, bin_hi)) = bins.iter().find(|(c, _, _)| {
            if below + c > k {
                return true;
            }
            below += c;
            false
        }) else {
            return Some(hi);
        };
        // The bin index is monotone in the value, so [bin_lo, bin_hi] holds
        // exactly this bin's samples.
        k -= below;
        count = c;
        lo = bin_lo;
        hi = bin_hi;
    }
}
