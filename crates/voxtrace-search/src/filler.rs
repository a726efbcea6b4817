//! Goal-less, cost-ordered flood fill from one or more seeds.
//!
//! The fill closes voxels in order of increasing cost from the nearest seed
//! until the open set empties, the next voxel would exceed the cost
//! threshold, or the iteration budget runs out. Voxels beyond the threshold
//! stay in the open set, so [`FloodFill::extend`] can grow the same fill
//! further without starting over.

use std::fmt;

use voxtrace_core::{Calibration, IntensitySource, Point3};

use crate::config::SearchConfig;
use crate::connectivity::NeighborTable;
use crate::cost::Cost;
use crate::error::{Result, SearchError};
use crate::frontier::Frontier;
use crate::node::{Direction, Phase, SearchNode};
use crate::search::{
    CancelToken, EdgeCost, ExitReason, Poll, ProgressListener, SearchStats, SearchStatus,
    StepMonitor, check_point, create_storage,
};
use crate::storage::{BackendKind, SearchImage};
use crate::tree::ResultTree;

const DIR: Direction = Direction::FromStart;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Stopping rules and restrictions of a [`FloodFill`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FillConfig {
    /// Largest cost a closed voxel may have.
    pub threshold: f64,
    /// Total closed-voxel budget across `run` and every `extend`.
    pub max_iterations: Option<u64>,
    /// Voxels with intensity at or below this are never entered.
    pub foreground_threshold: Option<f64>,
    pub search: SearchConfig,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            threshold: f64::INFINITY,
            max_iterations: None,
            foreground_threshold: None,
            search: SearchConfig::default(),
        }
    }
}

impl FillConfig {
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    #[must_use]
    pub const fn with_foreground_threshold(mut self, intensity: f64) -> Self {
        self.foreground_threshold = Some(intensity);
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "fill threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        self.search.validate()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why a fill stopped growing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FillCompletion {
    /// Every reachable voxel is closed.
    Exhausted,
    /// The cheapest open voxel costs more than the threshold.
    ThresholdReached,
    IterationLimit,
}

impl fmt::Display for FillCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("region exhausted"),
            Self::ThresholdReached => f.write_str("threshold reached"),
            Self::IterationLimit => f.write_str("iteration limit"),
        }
    }
}

/// What [`FloodFill::run`] and [`FloodFill::extend`] return.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillOutcome {
    /// `Succeeded` whenever the fill stopped on its own.
    pub status: SearchStatus,
    /// Set when `status` is `Succeeded`.
    pub completion: Option<FillCompletion>,
    /// Largest cost closed so far.
    pub max_distance: f64,
    pub stats: SearchStats,
}

/// One reached voxel of an exported [`Fill`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FillNode {
    pub point: Point3,
    pub distance: f64,
    /// Index of the predecessor in [`Fill::nodes`]; `None` for seeds.
    pub predecessor: Option<usize>,
    /// Reached but not yet closed.
    pub open: bool,
}

/// Self-contained snapshot of a fill, independent of its node storage.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fill {
    pub seeds: Vec<Point3>,
    pub threshold: f64,
    pub calibration: Calibration,
    /// Ordered by slice, then row, then column.
    pub nodes: Vec<FillNode>,
}

impl Fill {
    /// Nodes with a distance within the threshold.
    pub fn within_threshold(&self) -> impl Iterator<Item = &FillNode> + '_ {
        self.nodes.iter().filter(|n| n.distance <= self.threshold)
    }
}

// ---------------------------------------------------------------------------
// FloodFill
// ---------------------------------------------------------------------------

/// Dijkstra-style region growing over an intensity volume.
///
/// # Example
///
/// ```
/// use voxtrace_core::{Calibration, Point3, Volume};
/// use voxtrace_search::{FillConfig, FloodFill, Reciprocal};
///
/// let vol = Volume::from_fn(9, 9, 1, Calibration::default(), |_| 255.0).unwrap();
/// let mut fill = FloodFill::new(
///     &vol,
///     vec![Point3::new(4, 4, 0)],
///     Reciprocal::new(0.0, 255.0),
///     FillConfig::default(),
/// )
/// .unwrap();
/// fill.run().unwrap();
/// assert_eq!(fill.reached().unwrap().len(), 81);
/// ```
pub struct FloodFill<'a, S: ?Sized, C> {
    source: &'a S,
    seeds: Vec<Point3>,
    cost: C,
    config: FillConfig,
    storage: Box<dyn SearchImage>,
    frontier: Frontier,
    table: NeighborTable,
    status: SearchStatus,
    stats: SearchStats,
    completion: Option<FillCompletion>,
    max_distance: f64,
    cancel: CancelToken,
    listeners: Vec<Box<dyn ProgressListener + 'a>>,
}

impl<'a, S, C> FloodFill<'a, S, C>
where
    S: IntensitySource + ?Sized,
    C: Cost,
{
    /// Validate the seeds and allocate node storage. Seeds are entered even
    /// when they lie below the foreground threshold.
    pub fn new(source: &'a S, seeds: Vec<Point3>, cost: C, config: FillConfig) -> Result<Self> {
        config.validate()?;
        if seeds.is_empty() {
            return Err(SearchError::InvalidConfig("a fill needs at least one seed".into()));
        }
        for &s in &seeds {
            check_point(source, s)?;
        }
        let storage = create_storage(source, &config.search);
        let table = NeighborTable::new(config.search.connectivity, source.calibration());
        Ok(Self {
            source,
            seeds,
            cost,
            stats: SearchStats {
                backend: Some(storage.kind()),
                ..SearchStats::default()
            },
            config,
            storage,
            frontier: Frontier::new(DIR),
            table,
            status: SearchStatus::Ready,
            completion: None,
            max_distance: 0.0,
            cancel: CancelToken::new(),
            listeners: Vec::new(),
        })
    }

    pub fn add_listener(&mut self, listener: impl ProgressListener + 'a) {
        self.listeners.push(Box::new(listener));
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Share an existing cancellation flag, e.g. one driving several fills.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn completion(&self) -> Option<FillCompletion> {
        self.completion
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn seeds(&self) -> &[Point3] {
        &self.seeds
    }

    /// Largest cost closed so far.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn storage_kind(&self) -> BackendKind {
        self.storage.kind()
    }

    /// Grow from the seeds. Callable once; use [`extend`](Self::extend) to
    /// continue.
    pub fn run(&mut self) -> Result<FillOutcome> {
        if self.status != SearchStatus::Ready {
            return Err(SearchError::AlreadyStarted);
        }
        log::debug!(
            "fill from {} seed(s), threshold {} ({} storage)",
            self.seeds.len(),
            self.config.threshold,
            self.storage.kind()
        );
        for &s in &self.seeds {
            self.frontier.seed(&mut *self.storage, s, 0.0)?;
        }
        self.resume()
    }

    /// Raise the threshold and keep growing the same fill.
    pub fn extend(&mut self, threshold: f64) -> Result<FillOutcome> {
        if self.status == SearchStatus::Ready {
            self.config.threshold = threshold;
            return self.run();
        }
        if threshold.is_nan() || threshold < self.config.threshold {
            return Err(SearchError::InvalidConfig(format!(
                "cannot lower the fill threshold from {} to {threshold}",
                self.config.threshold
            )));
        }
        match self.status {
            SearchStatus::Failed(ExitReason::Aborted) => {
                return Err(SearchError::InvalidConfig(
                    "cannot extend a fill that failed with an error".into(),
                ));
            }
            // The token stays set, so a resumed fill would stop at once.
            SearchStatus::Failed(ExitReason::Cancelled) => {
                return Err(SearchError::InvalidConfig(
                    "cannot extend a cancelled fill".into(),
                ));
            }
            _ => {}
        }
        self.config.threshold = threshold;
        log::debug!("extending fill to threshold {threshold}");
        self.resume()
    }

    fn resume(&mut self) -> Result<FillOutcome> {
        self.status = SearchStatus::Running;
        self.completion = None;
        let status = match self.fill() {
            Ok(status) => status,
            Err(e) => {
                self.status = SearchStatus::Failed(ExitReason::Aborted);
                for l in &mut self.listeners {
                    l.finished(false);
                }
                return Err(e);
            }
        };
        self.status = status;
        for l in &mut self.listeners {
            l.max_distance_explored(self.max_distance);
            l.finished(status == SearchStatus::Succeeded);
        }
        if status == SearchStatus::Failed(ExitReason::Cancelled) {
            self.dispose()?;
            log::debug!("fill cancelled, node storage released");
        }
        match self.completion {
            Some(c) => log::debug!(
                "fill {c}: {} closed, {} open, max distance {}",
                self.stats.closed,
                self.stats.open,
                self.max_distance
            ),
            None => log::debug!("fill {status}"),
        }
        Ok(FillOutcome {
            status,
            completion: self.completion,
            max_distance: self.max_distance,
            stats: self.stats,
        })
    }

    fn fill(&mut self) -> Result<SearchStatus> {
        let source = self.source;
        let threshold = self.config.threshold;
        let budget = self.config.max_iterations;
        let foreground = self.config.foreground_threshold;
        let admit = |p: Point3| foreground.is_none_or(|t| source.value(p) > t);
        let edge = EdgeCost::new(&self.cost);
        let storage: &mut dyn SearchImage = &mut *self.storage;
        let frontier = &mut self.frontier;
        let mut monitor = StepMonitor::start(&self.config.search, self.cancel.clone());
        let mut steps = 0u64;

        let status = 'fill: loop {
            match monitor.poll(steps) {
                Poll::Stop(reason) => break 'fill SearchStatus::Failed(reason),
                Poll::Report => {
                    log::trace!(
                        "fill: {} open, {} closed, max distance {}",
                        frontier.open_nodes,
                        frontier.closed_nodes,
                        self.max_distance
                    );
                    for l in &mut self.listeners {
                        l.points_in_search(frontier.open_nodes, frontier.closed_nodes);
                        l.max_distance_explored(self.max_distance);
                    }
                }
                Poll::Continue => {}
            }

            let Some(next) = frontier.peek_live(storage)? else {
                self.completion = Some(FillCompletion::Exhausted);
                break 'fill SearchStatus::Succeeded;
            };
            if next.g > threshold {
                self.completion = Some(FillCompletion::ThresholdReached);
                break 'fill SearchStatus::Succeeded;
            }
            if budget.is_some_and(|max| self.stats.iterations >= max) {
                self.completion = Some(FillCompletion::IterationLimit);
                break 'fill SearchStatus::Succeeded;
            }

            let Some(current) = frontier.pop_live(storage)? else {
                continue;
            };
            steps += 1;
            self.stats.iterations += 1;
            frontier.close(storage, current.point)?;
            self.max_distance = self.max_distance.max(current.g);
            frontier.expand(storage, &mut self.table, source, &edge, &current, admit, |_| 0.0)?;
        };

        self.stats.open = frontier.open_nodes;
        self.stats.closed = frontier.closed_nodes;
        self.stats.elapsed += monitor.elapsed();
        Ok(status)
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Cost from the nearest seed, if `p` has been reached.
    pub fn distance_at(&mut self, p: Point3) -> Result<Option<f64>> {
        Ok(self
            .storage
            .get(p)?
            .filter(|n| n.phase(DIR) != Phase::Free)
            .map(|n| n.g(DIR)))
    }

    /// Whether `p` has been closed, i.e. its distance is final.
    pub fn is_closed(&mut self, p: Point3) -> Result<bool> {
        Ok(self.storage.get(p)?.is_some_and(|n| n.phase(DIR) == Phase::Closed))
    }

    /// Node state at `p`, if a node was created there.
    pub fn node_at(&mut self, p: Point3) -> Result<Option<SearchNode>> {
        Ok(self.storage.get(p)?.copied())
    }

    /// Slices holding at least one reached voxel, ascending.
    pub fn reached_slices(&self) -> Vec<i32> {
        self.storage.occupied_slices()
    }

    /// Reached voxels of slice `z`, ordered by row, then column.
    pub fn reached_in_slice(&mut self, z: i32) -> Result<Vec<(Point3, SearchNode)>> {
        Ok(self
            .storage
            .slice_iter(z)?
            .filter(|(_, n)| n.phase(DIR) != Phase::Free)
            .collect())
    }

    /// Every reached voxel, ordered by slice, then row, then column.
    pub fn reached(&mut self) -> Result<Vec<(Point3, SearchNode)>> {
        let mut out = Vec::with_capacity(self.storage.node_count());
        for z in self.reached_slices() {
            out.extend(self.reached_in_slice(z)?);
        }
        Ok(out)
    }

    /// Export the fill with predecessor links resolved to node indices.
    pub fn to_fill(&mut self) -> Result<Fill> {
        let reached = self.reached()?;
        let index: std::collections::HashMap<Point3, usize> = reached
            .iter()
            .enumerate()
            .map(|(i, (p, _))| (*p, i))
            .collect();
        let nodes = reached
            .iter()
            .map(|(p, n)| FillNode {
                point: *p,
                distance: n.g(DIR),
                predecessor: n.predecessor(DIR).and_then(|q| index.get(&q).copied()),
                open: n.phase(DIR) == Phase::Open,
            })
            .collect();
        Ok(Fill {
            seeds: self.seeds.clone(),
            threshold: self.config.threshold,
            calibration: self.source.calibration().clone(),
            nodes,
        })
    }

    /// Tree of the closed voxels, rooted at the seeds.
    pub fn to_tree(&mut self) -> Result<ResultTree> {
        let closed = self
            .reached()?
            .into_iter()
            .filter(|(_, n)| n.phase(DIR) == Phase::Closed)
            .map(|(p, n)| (p, n.predecessor(DIR)));
        Ok(ResultTree::from_predecessors(
            closed,
            self.source.calibration().clone(),
        ))
    }

    /// Release node storage and temporary files.
    pub fn dispose(&mut self) -> Result<()> {
        self.frontier.clear();
        self.storage.dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::cost::Reciprocal;
    use crate::storage::BackendChoice;
    use approx::assert_relative_eq;
    use voxtrace_core::Volume;

    fn bright(w: i32, h: i32) -> Volume {
        Volume::from_fn(w, h, 1, Calibration::default(), |_| 255.0).unwrap()
    }

    fn cfg() -> FillConfig {
        FillConfig::default().with_search(SearchConfig::default().with_connectivity(Connectivity::Six))
    }

    #[test]
    fn unbounded_fill_reaches_everything_once() {
        let v = bright(12, 7);
        let mut f = FloodFill::new(&v, vec![Point3::new(0, 0, 0)], Reciprocal::new(0.0, 255.0), cfg())
            .unwrap();
        let out = f.run().unwrap();
        assert_eq!(out.completion, Some(FillCompletion::Exhausted));
        assert_eq!(out.stats.closed, 84);
        assert_eq!(out.stats.open, 0);
        assert_eq!(out.stats.iterations, 84);
        let reached = f.reached().unwrap();
        assert_eq!(reached.len(), 84);
        // 6-connected in a plane: distance is the Manhattan distance.
        for (p, n) in &reached {
            assert_relative_eq!(n.g(DIR), (p.x + p.y) as f64 / 255.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn foreground_restriction_keeps_fill_inside() {
        // Bright 3-wide corridor at x in 4..7, dark elsewhere.
        let v = Volume::from_fn(12, 10, 1, Calibration::default(), |p| {
            if (4..7).contains(&p.x) { 200.0 } else { 5.0 }
        })
        .unwrap();
        let config = cfg().with_foreground_threshold(50.0);
        let mut f =
            FloodFill::new(&v, vec![Point3::new(5, 0, 0)], Reciprocal::new(0.0, 255.0), config)
                .unwrap();
        f.run().unwrap();
        let reached = f.reached().unwrap();
        assert_eq!(reached.len(), 30);
        assert!(reached.iter().all(|(p, _)| (4..7).contains(&p.x)));
        assert_eq!(f.distance_at(Point3::new(0, 0, 0)).unwrap(), None);
    }

    #[test]
    fn threshold_then_extend() {
        let v = bright(30, 1);
        let step = 1.0 / 255.0;
        let config = cfg().with_threshold(5.5 * step);
        let mut f =
            FloodFill::new(&v, vec![Point3::new(0, 0, 0)], Reciprocal::new(0.0, 255.0), config)
                .unwrap();
        let out = f.run().unwrap();
        assert_eq!(out.completion, Some(FillCompletion::ThresholdReached));
        assert_eq!(out.stats.closed, 6);
        assert!(f.is_closed(Point3::new(5, 0, 0)).unwrap());
        assert!(!f.is_closed(Point3::new(6, 0, 0)).unwrap());
        assert_relative_eq!(out.max_distance, 5.0 * step, max_relative = 1e-12);

        let out = f.extend(10.5 * step).unwrap();
        assert_eq!(out.completion, Some(FillCompletion::ThresholdReached));
        assert_eq!(out.stats.closed, 11);
        assert!(f.extend(1.0 * step).is_err());

        let out = f.extend(f64::INFINITY).unwrap();
        assert_eq!(out.completion, Some(FillCompletion::Exhausted));
        assert_eq!(out.stats.closed, 30);
        assert_eq!(out.stats.iterations, 30);
    }

    #[test]
    fn iteration_budget() {
        let v = bright(10, 10);
        let config = cfg().with_max_iterations(7);
        let mut f =
            FloodFill::new(&v, vec![Point3::new(5, 5, 0)], Reciprocal::new(0.0, 255.0), config)
                .unwrap();
        let out = f.run().unwrap();
        assert_eq!(out.completion, Some(FillCompletion::IterationLimit));
        assert_eq!(out.stats.closed, 7);
    }

    #[test]
    fn multiple_seeds_take_nearest() {
        let v = bright(11, 1);
        let mut f = FloodFill::new(
            &v,
            vec![Point3::new(0, 0, 0), Point3::new(10, 0, 0)],
            Reciprocal::new(0.0, 255.0),
            cfg(),
        )
        .unwrap();
        f.run().unwrap();
        fn d(f: &mut FloodFill<'_, Volume, Reciprocal>, x: i32) -> f64 {
            f.distance_at(Point3::new(x, 0, 0)).unwrap().unwrap() * 255.0
        }
        assert_relative_eq!(d(&mut f, 2), 2.0, max_relative = 1e-12);
        assert_relative_eq!(d(&mut f, 8), 2.0, max_relative = 1e-12);
        assert_relative_eq!(d(&mut f, 5), 5.0, max_relative = 1e-12);
        let tree = f.to_tree().unwrap();
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.len(), 11);
    }

    #[test]
    fn export_resolves_predecessors() {
        let v = bright(4, 4);
        let mut f = FloodFill::new(
            &v,
            vec![Point3::new(0, 0, 0)],
            Reciprocal::new(0.0, 255.0),
            cfg().with_threshold(1.5 / 255.0),
        )
        .unwrap();
        f.run().unwrap();
        let fill = f.to_fill().unwrap();
        // Seed, its two neighbours (closed) and three open voxels at distance 2.
        assert_eq!(fill.nodes.len(), 6);
        assert_eq!(fill.within_threshold().count(), 3);
        assert_eq!(fill.nodes.iter().filter(|n| n.open).count(), 3);
        for n in &fill.nodes {
            match n.predecessor {
                None => assert_eq!(n.point, Point3::new(0, 0, 0)),
                Some(i) => {
                    let prev = fill.nodes[i];
                    assert_eq!(prev.point.manhattan(n.point), 1);
                    assert!(prev.distance < n.distance);
                }
            }
        }
        let tree = f.to_tree().unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.leaves().len(), 2);
    }

    #[test]
    fn disk_backend_matches_array() {
        let v = Volume::from_fn(6, 5, 4, Calibration::default(), |p| {
            (40 + 20 * ((p.x + 2 * p.y + 3 * p.z) % 7)) as f32
        })
        .unwrap();
        let run = |backend| {
            let config = FillConfig::default().with_search(
                SearchConfig::default()
                    .with_backend(backend)
                    .with_disk_cache_slices(1),
            );
            let mut f =
                FloodFill::new(&v, vec![Point3::new(2, 2, 1)], Reciprocal::new(0.0, 255.0), config)
                    .unwrap();
            f.run().unwrap();
            f.to_fill().unwrap()
        };
        let array = run(BackendChoice::Array);
        assert_eq!(array.nodes.len(), 120);
        assert_eq!(run(BackendChoice::Disk), array);
        assert_eq!(run(BackendChoice::Sparse), array);
    }

    #[test]
    fn rejects_bad_input() {
        let v = bright(3, 3);
        let c = Reciprocal::new(0.0, 255.0);
        assert!(FloodFill::new(&v, vec![], c, cfg()).is_err());
        let err = FloodFill::new(&v, vec![Point3::new(3, 0, 0)], c, cfg()).err().unwrap();
        assert!(err.is_invalid_coordinate());
        assert!(FloodFill::new(&v, vec![Point3::ZERO], c, cfg().with_threshold(-1.0)).is_err());
    }

    #[test]
    fn cancelled_fill_cannot_be_extended() {
        let v = bright(6, 6);
        let c = Reciprocal::new(0.0, 255.0);
        let mut fill = FloodFill::new(&v, vec![Point3::ZERO], c, cfg()).unwrap();
        fill.cancel_token().cancel();
        let out = fill.run().unwrap();
        assert_eq!(out.status, SearchStatus::Failed(ExitReason::Cancelled));
        assert!(matches!(
            fill.extend(f64::INFINITY),
            Err(SearchError::InvalidConfig(_))
        ));
        assert_eq!(fill.status(), SearchStatus::Failed(ExitReason::Cancelled));
        assert!(fill.reached().unwrap().is_empty());
    }
}
