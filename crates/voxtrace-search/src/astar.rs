//! Unidirectional A* between two voxels.

use voxtrace_core::{IntensitySource, Point3};

use crate::config::SearchConfig;
use crate::connectivity::NeighborTable;
use crate::cost::Cost;
use crate::error::{Result, SearchError};
use crate::frontier::Frontier;
use crate::heuristic::Heuristic;
use crate::node::{Direction, SearchNode};
use crate::path::Path;
use crate::search::{
    CancelToken, EdgeCost, ExitReason, Poll, ProgressListener, SearchOutcome, SearchStats,
    SearchStatus, StepMonitor, backtrack, build_path, check_point, create_storage,
};
use crate::storage::{BackendKind, SearchImage};

/// Single-frontier best-first search from `start` towards `goal`.
///
/// The priority of a voxel is `g + min_step_cost · heuristic(voxel, goal)`,
/// which never overestimates the remaining cost for the bundled heuristics.
///
/// # Example
///
/// ```
/// use voxtrace_core::{Calibration, ImageStats, Point3, Volume};
/// use voxtrace_search::{AStarSearch, Euclidean, Reciprocal, SearchConfig};
///
/// let vol = Volume::from_fn(20, 20, 1, Calibration::default(), |p| {
///     if p.y == 10 { 255.0 } else { 10.0 }
/// })
/// .unwrap();
/// let stats = ImageStats::compute(&vol);
/// let mut search = AStarSearch::new(
///     &vol,
///     Point3::new(2, 10, 0),
///     Point3::new(17, 10, 0),
///     Reciprocal::new(stats.min, stats.max),
///     Euclidean,
///     SearchConfig::default(),
/// )
/// .unwrap();
/// let outcome = search.run().unwrap();
/// assert!(outcome.is_success());
/// assert_eq!(outcome.path.unwrap().len(), 16);
/// ```
pub struct AStarSearch<'a, S: ?Sized, C, H> {
    source: &'a S,
    start: Point3,
    goal: Point3,
    cost: C,
    heuristic: H,
    config: SearchConfig,
    storage: Box<dyn SearchImage>,
    status: SearchStatus,
    stats: SearchStats,
    cancel: CancelToken,
    listeners: Vec<Box<dyn ProgressListener + 'a>>,
    path: Option<Path>,
}

impl<'a, S, C, H> AStarSearch<'a, S, C, H>
where
    S: IntensitySource + ?Sized,
    C: Cost,
    H: Heuristic,
{
    /// Validate the inputs and allocate node storage.
    pub fn new(
        source: &'a S,
        start: Point3,
        goal: Point3,
        cost: C,
        heuristic: H,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_point(source, start)?;
        check_point(source, goal)?;
        let storage = create_storage(source, &config);
        Ok(Self {
            source,
            start,
            goal,
            cost,
            heuristic,
            config,
            stats: SearchStats {
                backend: Some(storage.kind()),
                ..SearchStats::default()
            },
            storage,
            status: SearchStatus::Ready,
            cancel: CancelToken::new(),
            listeners: Vec::new(),
            path: None,
        })
    }

    pub fn add_listener(&mut self, listener: impl ProgressListener + 'a) {
        self.listeners.push(Box::new(listener));
    }

    /// Handle for cancelling the run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    pub fn storage_kind(&self) -> BackendKind {
        self.storage.kind()
    }

    /// Search state of one voxel, for inspection after a run.
    pub fn node_at(&mut self, p: Point3) -> Result<Option<SearchNode>> {
        Ok(self.storage.get(p)?.copied())
    }

    /// Every node created in slice `z`.
    pub fn visit_nodes(&mut self, z: i32) -> Result<Vec<(Point3, SearchNode)>> {
        Ok(self.storage.slice_iter(z)?.collect())
    }

    /// Release node storage and temporary files.
    pub fn dispose(&mut self) -> Result<()> {
        self.storage.dispose()
    }

    /// Run to completion. Callable once.
    pub fn run(&mut self) -> Result<SearchOutcome> {
        if self.status != SearchStatus::Ready {
            return Err(SearchError::AlreadyStarted);
        }
        self.status = SearchStatus::Running;
        log::debug!(
            "A* from {} to {} ({}, {} storage)",
            self.start,
            self.goal,
            self.config.connectivity,
            self.storage.kind()
        );

        let result = self.search();
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                self.status = SearchStatus::Failed(ExitReason::Aborted);
                self.notify_finished(false);
                return Err(e);
            }
        };
        self.status = status;
        self.notify_finished(status == SearchStatus::Succeeded);
        if status == SearchStatus::Failed(ExitReason::Cancelled) {
            self.storage.dispose()?;
            log::debug!("A* cancelled, node storage released");
        }
        log::debug!(
            "A* {status} after {} iterations, {} points explored in {:?}",
            self.stats.iterations,
            self.stats.points_explored(),
            self.stats.elapsed
        );
        Ok(SearchOutcome {
            status,
            path: self.path.clone(),
            stats: self.stats,
        })
    }

    fn notify_finished(&mut self, success: bool) {
        for l in &mut self.listeners {
            l.finished(success);
        }
    }

    fn search(&mut self) -> Result<SearchStatus> {
        let source = self.source;
        let cal = source.calibration();
        let goal = self.goal;
        let edge = EdgeCost::new(&self.cost);
        let min_step = edge.min_step();
        let heuristic = &self.heuristic;
        let h = |p: Point3| min_step * heuristic.estimate(p, goal, cal);
        let storage: &mut dyn SearchImage = &mut *self.storage;
        let mut table = NeighborTable::new(self.config.connectivity, cal);
        let mut frontier = Frontier::new(Direction::FromStart);
        let mut monitor = StepMonitor::start(&self.config, self.cancel.clone());

        frontier.seed(storage, self.start, h(self.start))?;
        let mut iterations = 0u64;

        let status = 'search: loop {
            match monitor.poll(iterations) {
                Poll::Stop(reason) => break 'search SearchStatus::Failed(reason),
                Poll::Report => {
                    log::trace!(
                        "A*: {} open, {} closed",
                        frontier.open_nodes,
                        frontier.closed_nodes
                    );
                    for l in &mut self.listeners {
                        l.points_in_search(frontier.open_nodes, frontier.closed_nodes);
                    }
                }
                Poll::Continue => {}
            }

            let Some(current) = frontier.pop_live(storage)? else {
                break 'search SearchStatus::Failed(ExitReason::PointsExhausted);
            };
            iterations += 1;

            if current.point == goal {
                break 'search SearchStatus::Succeeded;
            }

            frontier.close(storage, current.point)?;
            frontier.expand(storage, &mut table, source, &edge, &current, |_| true, h)?;
        };

        self.stats.iterations = iterations;
        self.stats.open = frontier.open_nodes;
        self.stats.closed = frontier.closed_nodes;
        self.stats.elapsed = monitor.elapsed();

        if status == SearchStatus::Succeeded {
            let mut points = backtrack(storage, goal, Direction::FromStart)?;
            points.reverse();
            self.path = Some(build_path(source, &edge, points));
        }
        Ok(status)
    }
}
