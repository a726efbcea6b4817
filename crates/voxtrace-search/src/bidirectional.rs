//! Bidirectional best-first search (NBA*) with first-contact termination.
//!
//! Two frontiers share one node store: every [`SearchNode`] carries a cost
//! and predecessor per [`Direction`]. The search stops at the first voxel
//! closed by both sides. That voxel is not guaranteed to lie on an optimal
//! path; the returned path is usually close to optimal and found sooner.

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

/// Search growing from both endpoints until the frontiers touch.
pub struct BidirectionalSearch<'a, S: ?Sized, C, H> {
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
    meeting: Option<Point3>,
    path: Option<Path>,
}

impl<'a, S, C, H> BidirectionalSearch<'a, S, C, H>
where
    S: IntensitySource + ?Sized,
    C: Cost,
    H: Heuristic,
{
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
            meeting: None,
            path: None,
        })
    }

    pub fn add_listener(&mut self, listener: impl ProgressListener + 'a) {
        self.listeners.push(Box::new(listener));
    }

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

    /// The voxel where the two frontiers met, once the search succeeded.
    pub fn meeting_point(&self) -> Option<Point3> {
        self.meeting
    }

    pub fn storage_kind(&self) -> BackendKind {
        self.storage.kind()
    }

    pub fn node_at(&mut self, p: Point3) -> Result<Option<SearchNode>> {
        Ok(self.storage.get(p)?.copied())
    }

    pub fn visit_nodes(&mut self, z: i32) -> Result<Vec<(Point3, SearchNode)>> {
        Ok(self.storage.slice_iter(z)?.collect())
    }

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
            "NBA* between {} and {} ({}, {} storage)",
            self.start,
            self.goal,
            self.config.connectivity,
            self.storage.kind()
        );

        let status = match self.search() {
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
            log::debug!("NBA* cancelled, node storage released");
        }
        if let Some(m) = self.meeting {
            log::debug!("NBA* frontiers met at {m}");
        }
        log::debug!(
            "NBA* {status} after {} iterations, {} points explored in {:?}",
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
        let (start, goal) = (self.start, self.goal);
        let edge = EdgeCost::new(&self.cost);

        if start == goal {
            self.meeting = Some(start);
            self.path = Some(build_path(source, &edge, vec![start]));
            self.stats.elapsed = Default::default();
            return Ok(SearchStatus::Succeeded);
        }

        let min_step = edge.min_step();
        let heuristic = &self.heuristic;
        let to_goal = |p: Point3| min_step * heuristic.estimate(p, goal, cal);
        let to_start = |p: Point3| min_step * heuristic.estimate(p, start, cal);
        let storage: &mut dyn SearchImage = &mut *self.storage;
        let mut table = NeighborTable::new(self.config.connectivity, cal);
        let mut forward = Frontier::new(Direction::FromStart);
        let mut backward = Frontier::new(Direction::FromGoal);
        let mut monitor = StepMonitor::start(&self.config, self.cancel.clone());

        forward.seed(storage, start, to_goal(start))?;
        backward.seed(storage, goal, to_start(goal))?;
        let mut iterations = 0u64;
        let mut meeting = None;

        let status = 'search: loop {
            match monitor.poll(iterations) {
                Poll::Stop(reason) => break 'search SearchStatus::Failed(reason),
                Poll::Report => {
                    let open = forward.open_nodes + backward.open_nodes;
                    let closed = forward.closed_nodes + backward.closed_nodes;
                    log::trace!("NBA*: {open} open, {closed} closed");
                    for l in &mut self.listeners {
                        l.points_in_search(open, closed);
                    }
                }
                Poll::Continue => {}
            }

            let (Some(ahead), Some(behind)) =
                (forward.peek_live(storage)?, backward.peek_live(storage)?)
            else {
                break 'search SearchStatus::Failed(ExitReason::PointsExhausted);
            };
            // Ties go to the start side.
            let (side, h): (&mut Frontier, &dyn Fn(Point3) -> f64) = if ahead.f <= behind.f {
                (&mut forward, &to_goal)
            } else {
                (&mut backward, &to_start)
            };

            let Some(current) = side.pop_live(storage)? else {
                break 'search SearchStatus::Failed(ExitReason::PointsExhausted);
            };
            iterations += 1;

            side.close(storage, current.point)?;
            if storage
                .get(current.point)?
                .is_some_and(SearchNode::is_closed_by_both)
            {
                meeting = Some(current.point);
                break 'search SearchStatus::Succeeded;
            }
            side.expand(storage, &mut table, source, &edge, &current, |_| true, h)?;
        };

        self.stats.iterations = iterations;
        self.stats.open = forward.open_nodes + backward.open_nodes;
        self.stats.closed = forward.closed_nodes + backward.closed_nodes;
        self.stats.elapsed = monitor.elapsed();

        if let (SearchStatus::Succeeded, Some(m)) = (status, meeting) {
            let mut points = backtrack(storage, m, Direction::FromStart)?;
            points.reverse();
            let towards_goal = backtrack(storage, m, Direction::FromGoal)?;
            points.extend_from_slice(&towards_goal[1..]);
            self.meeting = Some(m);
            self.path = Some(build_path(source, &edge, points));
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astar::AStarSearch;
    use crate::cost::Reciprocal;
    use crate::heuristic::{Dijkstra, Euclidean};
    use crate::storage::BackendChoice;
    use approx::assert_relative_eq;
    use voxtrace_core::{Calibration, Volume};

    fn line_image() -> Volume {
        Volume::from_fn(40, 20, 1, Calibration::default(), |p| {
            if p.y == 10 { 200.0 } else { 20.0 }
        })
        .unwrap()
    }

    fn search(
        v: &Volume,
        a: Point3,
        b: Point3,
    ) -> BidirectionalSearch<'_, Volume, Reciprocal, Euclidean> {
        BidirectionalSearch::new(
            v,
            a,
            b,
            Reciprocal::new(0.0, 255.0),
            Euclidean,
            SearchConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn meets_on_the_line() {
        let v = line_image();
        let (a, b) = (Point3::new(2, 10, 0), Point3::new(37, 10, 0));
        let mut s = search(&v, a, b);
        let out = s.run().unwrap();
        assert!(out.is_success());
        let path = out.path.unwrap();
        assert_eq!(path.start(), Some(a));
        assert_eq!(path.end(), Some(b));
        assert!(path.points().iter().all(|p| p.y == 10));
        assert_relative_eq!(path.length(), 35.0);
        let m = s.meeting_point().unwrap();
        assert!(path.contains(m));
        let node = s.node_at(m).unwrap().unwrap();
        assert!(node.is_closed_by_both());
    }

    #[test]
    fn path_is_connected_without_duplicates() {
        let v = line_image();
        let mut s = search(&v, Point3::new(1, 1, 0), Point3::new(38, 18, 0));
        let path = s.run().unwrap().path.unwrap();
        for w in path.points().windows(2) {
            assert_ne!(w[0], w[1]);
            assert_eq!(w[0].chebyshev(w[1]), 1);
        }
    }

    #[test]
    fn close_to_optimal() {
        let v = line_image();
        let (a, b) = (Point3::new(3, 2, 0), Point3::new(33, 17, 0));
        let optimal = AStarSearch::new(
            &v,
            a,
            b,
            Reciprocal::new(0.0, 255.0),
            Dijkstra,
            SearchConfig::default(),
        )
        .unwrap()
        .run()
        .unwrap()
        .path
        .unwrap()
        .total_cost();
        let bi = search(&v, a, b).run().unwrap().path.unwrap().total_cost();
        assert!(bi >= optimal - 1e-12);
        assert!(bi <= optimal * 1.5, "{bi} vs {optimal}");
    }

    #[test]
    fn start_equals_goal() {
        let v = line_image();
        let p = Point3::new(4, 4, 0);
        let mut s = search(&v, p, p);
        let out = s.run().unwrap();
        assert_eq!(out.path.unwrap().points(), &[p]);
        assert_eq!(s.meeting_point(), Some(p));
    }

    #[test]
    fn neighbours_meet_immediately() {
        let v = line_image();
        let (a, b) = (Point3::new(5, 10, 0), Point3::new(6, 10, 0));
        let mut s = search(&v, a, b);
        let out = s.run().unwrap();
        assert_eq!(out.path.unwrap().points(), &[a, b]);
    }

    #[test]
    fn same_result_on_every_backend() {
        let v = line_image();
        let (a, b) = (Point3::new(0, 3, 0), Point3::new(39, 16, 0));
        let run = |backend| {
            BidirectionalSearch::new(
                &v,
                a,
                b,
                Reciprocal::new(0.0, 255.0),
                Euclidean,
                SearchConfig::default()
                    .with_backend(backend)
                    .with_disk_cache_slices(1),
            )
            .unwrap()
            .run()
            .unwrap()
            .path
            .unwrap()
        };
        let array = run(BackendChoice::Array);
        assert_eq!(run(BackendChoice::Sparse), array);
        assert_eq!(run(BackendChoice::Disk), array);
    }

    #[test]
    fn run_twice_is_an_error() {
        let v = line_image();
        let mut s = search(&v, Point3::new(0, 0, 0), Point3::new(2, 0, 0));
        s.run().unwrap();
        assert!(matches!(s.run(), Err(SearchError::AlreadyStarted)));
    }

    #[test]
    fn cancelling_mid_run_releases_disk_storage() {
        struct CancelOnReport(CancelToken);
        impl ProgressListener for CancelOnReport {
            fn points_in_search(&mut self, _open: usize, _closed: usize) {
                self.0.cancel();
            }
        }

        let v = line_image();
        let config = SearchConfig::default()
            .with_backend(BackendChoice::Disk)
            .with_disk_cache_slices(1)
            .with_report_interval(std::time::Duration::ZERO)
            .with_check_interval(1);
        let mut s = BidirectionalSearch::new(
            &v,
            Point3::new(2, 10, 0),
            Point3::new(37, 10, 0),
            Reciprocal::new(0.0, 255.0),
            Euclidean,
            config,
        )
        .unwrap();
        let token = s.cancel_token();
        s.add_listener(CancelOnReport(token));
        let out = s.run().unwrap();
        assert_eq!(out.status, SearchStatus::Failed(ExitReason::Cancelled));
        assert!(out.stats.points_explored() > 0);
        assert_eq!(s.storage_kind(), BackendKind::Disk);
        assert_eq!(s.storage.node_count(), 0);
        assert_eq!(s.storage.estimated_bytes(), 0);
        assert!(s.visit_nodes(0).unwrap().is_empty());
    }
}
