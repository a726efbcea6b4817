//! Automatic tracing of a whole branching structure from one seed.
//!
//! The pipeline runs four stages over the same storage backend:
//!
//! 1. **Threshold.** Voxels at or below the background threshold are never
//!    entered. The threshold is estimated from the image unless given.
//! 2. **Grayscale-weighted distance transform.** A multi-seed fill from
//!    every background voxel touching the foreground, where entering a voxel
//!    costs its intensity times the step length. Bright, thick parts of the
//!    structure end up with large values.
//! 3. **Marching.** A fill from the seed over the transform with
//!    [`GwdtCost`], which prefers high transform values and so keeps paths
//!    on the structure's centre line.
//! 4. **Extraction.** Leaves of the marching tree are taken farthest first.
//!    Each one not yet covered is walked back towards the seed until it
//!    meets the traced tree. The segment is kept if it is long enough and
//!    mostly outside the spheres already covered by kept segments. Radii come
//!    from shell sampling of the image and are computed on the rayon pool.
//!
//! Transform values, the marching result and the coverage mask all live in
//! storage of the resolved backend kind, so a disk-backed trace keeps only
//! its cached slices in memory.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use voxtrace_core::{Bounds, Calibration, ImageStats, IntensitySource, Point3, percentile};

use crate::config::SearchConfig;
use crate::connectivity::Connectivity;
use crate::cost::Cost;
use crate::error::{Result, SearchError};
use crate::filler::{FillConfig, FloodFill};
use crate::node::{Direction, Phase, SearchNode};
use crate::search::{CancelToken, SearchStats, SearchStatus, check_point};
use crate::storage::{BackendKind, SliceField};
use crate::tree::ResultTree;

const DIR: Direction = Direction::FromStart;

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

/// Per-unit cost equal to the intensity itself. Drives the distance
/// transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IntensityCost;

impl Cost for IntensityCost {
    #[inline]
    fn cost_moving_to(&self, value: f64) -> f64 {
        value
    }

    fn min_step_cost(&self) -> f64 {
        f64::MIN_POSITIVE
    }
}

/// `1 + (max - g) / max` for a transform value `g`: between 1 on the
/// brightest centre line and 2 at the structure's edge.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GwdtCost {
    max: f64,
}

impl GwdtCost {
    /// A non-positive maximum is replaced by 1.
    pub fn new(max_gwdt: f64) -> Self {
        let max = if max_gwdt.is_finite() && max_gwdt > 0.0 {
            max_gwdt
        } else {
            1.0
        };
        Self { max }
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Cost for GwdtCost {
    #[inline]
    fn cost_moving_to(&self, g: f64) -> f64 {
        1.0 + (self.max - g.clamp(0.0, self.max)) / self.max
    }

    fn min_step_cost(&self) -> f64 {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Configuration and outcome
// ---------------------------------------------------------------------------

/// Settings for [`GwdtTracer`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TracerConfig {
    /// Intensities at or below this are background. `None` estimates it.
    pub background_threshold: Option<f64>,
    pub connectivity: Connectivity,
    /// Shortest segment kept, counted as the sum of intensities along it
    /// divided by the image maximum. A bright voxel counts as one.
    pub min_segment_length: f64,
    /// Smallest ratio of new to already covered signal for a segment to be
    /// kept.
    pub coverage_ratio: f64,
    /// Largest radius estimated, in voxels.
    pub max_radius: i32,
    /// Backend choice, timeout and progress cadence for both fills. Its
    /// connectivity is replaced by [`connectivity`](Self::connectivity).
    pub search: SearchConfig,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            background_threshold: None,
            connectivity: Connectivity::Eighteen,
            min_segment_length: 5.0,
            coverage_ratio: 1.0 / 9.0,
            max_radius: 50,
            search: SearchConfig::default(),
        }
    }
}

impl TracerConfig {
    #[must_use]
    pub const fn with_background_threshold(mut self, threshold: f64) -> Self {
        self.background_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub const fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub const fn with_min_segment_length(mut self, length: f64) -> Self {
        self.min_segment_length = length;
        self
    }

    #[must_use]
    pub const fn with_coverage_ratio(mut self, ratio: f64) -> Self {
        self.coverage_ratio = ratio;
        self
    }

    #[must_use]
    pub const fn with_max_radius(mut self, voxels: i32) -> Self {
        self.max_radius = voxels;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_segment_length.is_nan() || self.min_segment_length < 0.0 {
            return Err(SearchError::InvalidConfig(
                "min_segment_length must be non-negative".into(),
            ));
        }
        if self.coverage_ratio.is_nan() || self.coverage_ratio < 0.0 {
            return Err(SearchError::InvalidConfig(
                "coverage_ratio must be non-negative".into(),
            ));
        }
        if self.max_radius < 1 {
            return Err(SearchError::InvalidConfig("max_radius must be at least 1".into()));
        }
        self.search.validate()
    }
}

/// Counters for one trace.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TraceStats {
    /// Voxels above the background threshold.
    pub foreground: u64,
    /// Voxels reached from the seed.
    pub reached: usize,
    pub segments_kept: usize,
    pub segments_rejected: usize,
    pub transform: SearchStats,
    pub marching: SearchStats,
    /// Bytes the transform field and coverage mask held in memory when
    /// extraction finished.
    pub side_table_bytes: u64,
    pub elapsed: Duration,
}

/// What [`GwdtTracer::run`] returns.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceOutcome {
    /// `Failed` when a fill timed out or was cancelled; the tree is then
    /// empty.
    pub status: SearchStatus,
    pub tree: ResultTree,
    /// Largest transform value; 1 when the transform was empty.
    pub gwdt_max: f64,
    pub threshold: f64,
    pub stats: TraceStats,
}

// ---------------------------------------------------------------------------
// Threshold and radius estimation
// ---------------------------------------------------------------------------

/// Background threshold estimated from the image: the mean of
/// `min + 5% of the range` and the 90th percentile.
pub fn auto_threshold<S: IntensitySource + ?Sized>(source: &S) -> f64 {
    let stats = ImageStats::compute(source);
    let p90 = percentile(source, 90.0).unwrap_or(stats.max);
    (stats.min + 0.05 * stats.range() + p90) / 2.0
}

/// Radius in voxels of the structure around `p`: the first spherical shell
/// holding background, capped at `cap` and at half the smaller of width and
/// height. Volumes at most three slices deep are sampled in-plane.
pub fn shell_radius<S: IntensitySource + ?Sized>(
    source: &S,
    p: Point3,
    threshold: f64,
    cap: i32,
) -> i32 {
    let b = source.bounds();
    let flat = b.depth() <= 3;
    let max_r = cap.min(b.width().min(b.height()) / 2);
    for r in 1..=max_r {
        let zr = if flat { 0 } else { r };
        let (inner, outer) = (f64::from(r - 1), f64::from(r));
        let mut total = 0u32;
        let mut background = 0u32;
        for dz in -zr..=zr {
            let z = p.z + dz;
            if z < b.min.z || z >= b.max.z {
                continue;
            }
            for dy in -r..=r {
                let y = p.y + dy;
                if y < b.min.y || y >= b.max.y {
                    return r;
                }
                for dx in -r..=r {
                    let x = p.x + dx;
                    if x < b.min.x || x >= b.max.x {
                        return r;
                    }
                    let d = f64::from(dx * dx + dy * dy + dz * dz).sqrt();
                    if d <= inner || d > outer {
                        continue;
                    }
                    total += 1;
                    if source.value(Point3::new(x, y, z)) <= threshold {
                        background += 1;
                        if f64::from(background) / f64::from(total) > 0.001 {
                            return r;
                        }
                    }
                }
            }
        }
    }
    max_r
}

// ---------------------------------------------------------------------------
// Transform field
// ---------------------------------------------------------------------------

/// Background marker of [`TransformField`]; below every transform value.
const BACKGROUND: f32 = -1.0;

struct FieldState {
    values: SliceField<f32>,
    // First storage error hit while reading; reported after marching.
    error: Option<SearchError>,
}

/// The distance transform as a searchable volume over the source's bounds.
///
/// Background voxels read as [`BACKGROUND`], foreground voxels the transform
/// never reached as zero.
struct TransformField<'a, S: ?Sized> {
    source: &'a S,
    threshold: f64,
    state: Mutex<FieldState>,
}

impl<'a, S: IntensitySource + ?Sized> TransformField<'a, S> {
    fn new(source: &'a S, threshold: f64, values: SliceField<f32>) -> Self {
        Self {
            source,
            threshold,
            state: Mutex::new(FieldState {
                values,
                error: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FieldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_error(&self) -> Result<()> {
        match self.lock().error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn estimated_bytes(&self) -> u64 {
        self.lock().values.estimated_bytes()
    }

    fn dispose(&self) -> Result<()> {
        self.lock().values.dispose()
    }
}

impl<S: IntensitySource + ?Sized> IntensitySource for TransformField<'_, S> {
    fn bounds(&self) -> Bounds {
        self.source.bounds()
    }

    fn calibration(&self) -> &Calibration {
        self.source.calibration()
    }

    fn value(&self, p: Point3) -> f64 {
        if self.source.value(p) <= self.threshold {
            return f64::from(BACKGROUND);
        }
        let mut state = self.lock();
        match state.values.get(p) {
            Ok(v) => f64::from(v),
            Err(e) => {
                state.error.get_or_insert(e);
                f64::from(BACKGROUND)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GwdtTracer
// ---------------------------------------------------------------------------

/// Traces every branch reachable from `seed` without user-given endpoints.
///
/// # Example
///
/// ```
/// use voxtrace_core::{Calibration, Point3, Volume};
/// use voxtrace_search::{GwdtTracer, TracerConfig};
///
/// // A bright bar five voxels thick on a dark background.
/// let vol = Volume::from_fn(40, 15, 1, Calibration::default(), |p| {
///     if (5..10).contains(&p.y) { 200.0 } else { 10.0 }
/// })
/// .unwrap();
/// let tracer = GwdtTracer::new(&vol, Point3::new(3, 7, 0), TracerConfig::default()).unwrap();
/// let outcome = tracer.run().unwrap();
/// assert!(outcome.tree.len() > 30);
/// ```
pub struct GwdtTracer<'a, S: ?Sized> {
    source: &'a S,
    seed: Point3,
    config: TracerConfig,
    cancel: CancelToken,
}

impl<'a, S: IntensitySource + ?Sized> GwdtTracer<'a, S> {
    pub fn new(source: &'a S, seed: Point3, config: TracerConfig) -> Result<Self> {
        config.validate()?;
        check_point(source, seed)?;
        Ok(Self {
            source,
            seed,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Handle that stops whichever fill is running.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// The configured threshold, or the estimated one.
    pub fn background_threshold(&self) -> f64 {
        self.config
            .background_threshold
            .unwrap_or_else(|| auto_threshold(self.source))
    }

    pub fn run(&self) -> Result<TraceOutcome> {
        let started = Instant::now();
        let source = self.source;
        let bounds = source.bounds();
        let threshold = self.background_threshold();
        if source.value(self.seed) <= threshold {
            return Err(SearchError::InvalidConfig(format!(
                "seed {} lies in the background (threshold {threshold})",
                self.seed
            )));
        }

        // One backend kind for both fills and every side table.
        let base = &self.config.search;
        let kind = base.factory().resolve(base.backend, bounds);
        let search = base
            .clone()
            .with_backend(kind.into())
            .with_connectivity(self.config.connectivity);
        log::info!(
            "tracing from {} with background threshold {threshold:.3} ({kind} storage)",
            self.seed
        );

        let mut stats = TraceStats::default();
        let mut outcome = TraceOutcome {
            status: SearchStatus::Succeeded,
            tree: ResultTree::new(source.calibration().clone()),
            gwdt_max: 1.0,
            threshold,
            stats,
        };

        let (field, gwdt_max, status) = self.transform(threshold, &search, kind, &mut stats)?;
        outcome.gwdt_max = gwdt_max;
        if status != SearchStatus::Succeeded {
            field.dispose()?;
            stats.elapsed = started.elapsed();
            outcome.status = status;
            outcome.stats = stats;
            return Ok(outcome);
        }
        log::info!(
            "distance transform: {} foreground voxels, max {gwdt_max:.3}",
            stats.foreground
        );

        let config = FillConfig::default()
            .with_foreground_threshold(f64::from(BACKGROUND) / 2.0)
            .with_search(search.clone());
        let mut march = FloodFill::new(&field, vec![self.seed], GwdtCost::new(gwdt_max), config)?
            .with_cancel_token(self.cancel.clone());
        let marched = march.run()?;
        stats.marching = marched.stats;
        field.take_error()?;
        if marched.status != SearchStatus::Succeeded {
            march.dispose()?;
            field.dispose()?;
            stats.elapsed = started.elapsed();
            outcome.status = marched.status;
            outcome.stats = stats;
            return Ok(outcome);
        }

        outcome.tree = self.extract(&mut march, &search, kind, threshold, &mut stats)?;
        stats.side_table_bytes += field.estimated_bytes();
        march.dispose()?;
        field.dispose()?;
        stats.elapsed = started.elapsed();
        log::info!(
            "kept {} of {} segments, {} tree nodes in {:?}",
            stats.segments_kept,
            stats.segments_kept + stats.segments_rejected,
            outcome.tree.len(),
            stats.elapsed
        );
        if outcome.tree.len() <= 1 {
            log::warn!("trace from {} produced no branches", self.seed);
        }
        outcome.stats = stats;
        Ok(outcome)
    }

    /// Stage 2: fill from the background boundary into the foreground.
    fn transform(
        &self,
        threshold: f64,
        search: &SearchConfig,
        kind: BackendKind,
        stats: &mut TraceStats,
    ) -> Result<(TransformField<'a, S>, f64, SearchStatus)> {
        let source = self.source;
        let bounds = source.bounds();
        let is_foreground = |p: Point3| source.value(p) > threshold;
        let offsets = self.config.connectivity.offsets();

        let mut seeds = Vec::new();
        for p in bounds.iter() {
            if is_foreground(p) {
                stats.foreground += 1;
                continue;
            }
            let touches = offsets.iter().any(|&d| {
                let n = p + d;
                bounds.contains(n) && is_foreground(n)
            });
            if touches {
                seeds.push(p);
            }
        }
        let mut values = search.factory().create_field(kind, bounds, 0.0f32);
        if seeds.is_empty() {
            return Ok((
                TransformField::new(source, threshold, values),
                1.0,
                SearchStatus::Succeeded,
            ));
        }

        let config = FillConfig::default()
            .with_foreground_threshold(threshold)
            .with_search(search.clone());
        let mut fill = FloodFill::new(source, seeds, IntensityCost, config)?
            .with_cancel_token(self.cancel.clone());
        let out = fill.run()?;
        stats.transform = out.stats;
        if out.status != SearchStatus::Succeeded {
            fill.dispose()?;
            return Ok((TransformField::new(source, threshold, values), 1.0, out.status));
        }

        let mut max = 0.0f64;
        for z in fill.reached_slices() {
            for (p, node) in fill.reached_in_slice(z)? {
                if !is_foreground(p) {
                    continue;
                }
                let g = node.g(DIR);
                values.set(p, g as f32)?;
                max = max.max(g);
            }
        }
        fill.dispose()?;
        Ok((
            TransformField::new(source, threshold, values),
            GwdtCost::new(max).max(),
            SearchStatus::Succeeded,
        ))
    }

    /// Stage 4: farthest-first segment extraction over the marching fill.
    fn extract<F: IntensitySource + ?Sized>(
        &self,
        march: &mut FloodFill<'_, F, GwdtCost>,
        search: &SearchConfig,
        kind: BackendKind,
        threshold: f64,
        stats: &mut TraceStats,
    ) -> Result<ResultTree> {
        let source = self.source;
        let bounds = source.bounds();
        let cal = source.calibration();
        let cap = self.config.max_radius;
        let radius_of = |p: Point3| shell_radius(source, p, threshold, cap);
        let max_intensity = {
            let m = ImageStats::compute(source).max;
            if m > 0.0 { m } else { 1.0 }
        };

        let (mut leaves, reached) = closed_leaves(march)?;
        stats.reached = reached;
        log::info!("marching reached {reached} voxels, {} leaves", leaves.len());
        leaves.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut tree = ResultTree::new(cal.clone());
        let root = tree.add_root(self.seed);
        let seed_radius = radius_of(self.seed);
        tree.set_radius(root, f64::from(seed_radius) * cal.x);
        let mut covered = search.factory().create_field(kind, bounds, false);
        cover(&mut covered, bounds, self.seed, seed_radius)?;

        let mut chain = Vec::new();
        for (leaf, _) in leaves {
            if tree.contains(leaf) || covered.get(leaf)? {
                continue;
            }
            chain.clear();
            let mut cur = leaf;
            let anchor = loop {
                if let Some(i) = tree.index_of(cur) {
                    break Some(i);
                }
                chain.push(cur);
                match march.node_at(cur)?.and_then(|n| n.predecessor(DIR)) {
                    Some(prev) => cur = prev,
                    None => break None,
                }
            };
            let Some(anchor) = anchor else {
                stats.segments_rejected += 1;
                continue;
            };

            let length: f64 = chain.iter().map(|&p| source.value(p) / max_intensity).sum();
            let (mut signal, mut redundant) = (0.0, 0.0);
            for &p in &chain {
                let v = source.value(p);
                if covered.get(p)? {
                    redundant += v;
                } else {
                    signal += v;
                }
            }
            let novel = redundant <= 0.0 || signal / redundant >= self.config.coverage_ratio;
            if length < self.config.min_segment_length || !novel {
                stats.segments_rejected += 1;
                continue;
            }

            let radii: Vec<i32> = chain.par_iter().map(|&p| radius_of(p)).collect();
            let mut parent = anchor;
            for (&p, &r) in chain.iter().zip(&radii).rev() {
                parent = tree.add_child(parent, p);
                tree.set_radius(parent, f64::from(r) * cal.x);
                cover(&mut covered, bounds, p, r)?;
            }
            stats.segments_kept += 1;
        }
        stats.side_table_bytes += covered.estimated_bytes();
        covered.dispose()?;
        Ok(tree)
    }
}

/// Closed voxels of a fill that are no closed voxel's predecessor, with
/// their distances, plus the number of closed voxels.
///
/// Predecessors are neighbours, so slice `z` only needs slices `z - 1` to
/// `z + 1` in memory.
fn closed_leaves<F, C>(fill: &mut FloodFill<'_, F, C>) -> Result<(Vec<(Point3, f64)>, usize)>
where
    F: IntensitySource + ?Sized,
    C: Cost,
{
    let slices = fill.reached_slices();
    let occupied: HashSet<i32> = slices.iter().copied().collect();
    let mut window: HashMap<i32, Vec<(Point3, SearchNode)>> = HashMap::new();
    let mut leaves = Vec::new();
    let mut reached = 0;
    for &z in &slices {
        window.retain(|&k, _| k >= z - 1);
        for k in [z - 1, z, z + 1] {
            if occupied.contains(&k) && !window.contains_key(&k) {
                let closed = fill
                    .reached_in_slice(k)?
                    .into_iter()
                    .filter(|(_, n)| n.phase(DIR) == Phase::Closed)
                    .collect();
                window.insert(k, closed);
            }
        }
        let referenced: HashSet<Point3> = window
            .values()
            .flatten()
            .filter_map(|(_, n)| n.predecessor(DIR))
            .filter(|p| p.z == z)
            .collect();
        if let Some(here) = window.get(&z) {
            reached += here.len();
            leaves.extend(
                here.iter()
                    .filter(|(p, _)| !referenced.contains(p))
                    .map(|(p, n)| (*p, n.g(DIR))),
            );
        }
    }
    Ok((leaves, reached))
}

/// Mark every voxel within `r` of `p` as covered.
fn cover(covered: &mut SliceField<bool>, bounds: Bounds, p: Point3, r: i32) -> Result<()> {
    let zr = if bounds.depth() <= 3 { 0 } else { r };
    let r2 = i64::from(r) * i64::from(r);
    for dz in -zr..=zr {
        for dy in -r..=r {
            for dx in -r..=r {
                let d = Point3::new(dx, dy, dz);
                let q = p + d;
                if d.distance_sq(Point3::ZERO) <= r2 && bounds.contains(q) {
                    covered.set(q, true)?;
                }
            }
        }
    }
    Ok(())
}
