//! Lifecycle, statistics, progress and cancellation shared by all searches.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use voxtrace_core::{IntensitySource, Point3};

use crate::config::SearchConfig;
use crate::cost::Cost;
use crate::error::{Result, SearchError};
use crate::path::Path;
use crate::storage::{BackendKind, SearchImage};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Why a search stopped without a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExitReason {
    /// Every reachable voxel was closed without reaching the goal.
    PointsExhausted,
    TimedOut,
    Cancelled,
    /// `run` returned an error, e.g. a storage failure.
    Aborted,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointsExhausted => f.write_str("no path found"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Lifecycle of a search: `Ready → Running → Succeeded | Failed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchStatus {
    #[default]
    Ready,
    Running,
    Succeeded,
    Failed(ExitReason),
}

impl SearchStatus {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics and outcome
// ---------------------------------------------------------------------------

/// Counters describing a (possibly unfinished) run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchStats {
    /// Open-set pops, stale entries excluded.
    pub iterations: u64,
    /// Nodes currently open.
    pub open: usize,
    /// Nodes closed so far.
    pub closed: usize,
    pub elapsed: Duration,
    pub backend: Option<BackendKind>,
}

impl SearchStats {
    /// Open plus closed nodes.
    #[inline]
    pub fn points_explored(&self) -> usize {
        self.open + self.closed
    }
}

/// What [`run`](crate::AStarSearch::run) returns.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    /// Present exactly when `status` is `Succeeded`.
    pub path: Option<Path>,
    pub stats: SearchStats,
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SearchStatus::Succeeded
    }
}

// ---------------------------------------------------------------------------
// Cancellation and progress
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the search to stop at its next step boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Receives periodic progress from a running search.
pub trait ProgressListener: Send {
    /// Called at most once per report interval.
    fn points_in_search(&mut self, _open: usize, _closed: usize) {}

    /// Fills only: the largest cost closed so far.
    fn max_distance_explored(&mut self, _distance: f64) {}

    /// Called once when the search ends.
    fn finished(&mut self, _success: bool) {}
}

// ---------------------------------------------------------------------------
// StepMonitor
// ---------------------------------------------------------------------------

pub(crate) enum Poll {
    Continue,
    Report,
    Stop(ExitReason),
}

/// Wall clock, timeout, cancellation and report cadence for one run.
pub(crate) struct StepMonitor {
    started: Instant,
    last_report: Instant,
    timeout: Option<Duration>,
    report_interval: Duration,
    check_interval: u64,
    cancel: CancelToken,
}

impl StepMonitor {
    pub(crate) fn start(config: &SearchConfig, cancel: CancelToken) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_report: now,
            timeout: config.timeout,
            report_interval: config.report_interval,
            check_interval: config.check_interval.max(1),
            cancel,
        }
    }

    /// Called at each step boundary with the number of steps taken so far.
    pub(crate) fn poll(&mut self, iterations: u64) -> Poll {
        if self.cancel.is_cancelled() {
            return Poll::Stop(ExitReason::Cancelled);
        }
        if iterations % self.check_interval != 0 {
            return Poll::Continue;
        }
        let now = Instant::now();
        if let Some(limit) = self.timeout {
            if now.duration_since(self.started) > limit {
                return Poll::Stop(ExitReason::TimedOut);
            }
        }
        if now.duration_since(self.last_report) >= self.report_interval {
            self.last_report = now;
            return Poll::Report;
        }
        Poll::Continue
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the search implementations
// ---------------------------------------------------------------------------

/// Edge costs: per-unit cost of the destination voxel, clamped from below,
/// times the physical step length.
pub(crate) struct EdgeCost<'a, C: ?Sized> {
    cost: &'a C,
    min_step: f64,
}

impl<'a, C: Cost + ?Sized> EdgeCost<'a, C> {
    pub(crate) fn new(cost: &'a C) -> Self {
        Self {
            cost,
            min_step: cost.min_step_cost(),
        }
    }

    #[inline]
    pub(crate) fn min_step(&self) -> f64 {
        self.min_step
    }

    /// Per-unit cost of entering a voxel of intensity `value`.
    #[inline]
    pub(crate) fn unit(&self, value: f64) -> f64 {
        self.cost.cost_moving_to(value).max(self.min_step)
    }

    /// Cost of a step of physical `length` into a voxel of intensity `value`.
    #[inline]
    pub(crate) fn step(&self, value: f64, length: f64) -> f64 {
        self.unit(value) * length
    }

    /// Total cost of walking `points` in order.
    pub(crate) fn along<S: IntensitySource + ?Sized>(&self, source: &S, points: &[Point3]) -> f64 {
        let cal = source.calibration();
        points
            .windows(2)
            .map(|w| self.step(source.value(w[1]), cal.distance(w[0], w[1])))
            .sum()
    }
}

pub(crate) fn check_point<S: IntensitySource + ?Sized>(source: &S, p: Point3) -> Result<()> {
    let bounds = source.bounds();
    if bounds.contains(p) {
        Ok(())
    } else {
        Err(SearchError::invalid_coordinate(p, bounds))
    }
}

/// Fresh storage for `source` per the configured backend choice.
pub(crate) fn create_storage<S: IntensitySource + ?Sized>(
    source: &S,
    config: &SearchConfig,
) -> Box<dyn SearchImage> {
    config.factory().create_for(config.backend, source.bounds())
}

pub(crate) fn build_path<S: IntensitySource + ?Sized, C: Cost + ?Sized>(
    source: &S,
    edge: &EdgeCost<'_, C>,
    points: Vec<Point3>,
) -> Path {
    let total = edge.along(source, &points);
    Path::new(points, source.calibration().clone(), total)
}

/// Predecessor chain from `from` back to the origin of `dir`, `from` first.
pub(crate) fn backtrack(
    storage: &mut dyn SearchImage,
    from: Point3,
    dir: crate::node::Direction,
) -> Result<Vec<Point3>> {
    // g strictly decreases along predecessor links, so the chain ends.
    let mut out = vec![from];
    let mut cur = from;
    while let Some(prev) = storage.get(cur)?.and_then(|n| n.predecessor(dir)) {
        out.push(prev);
        cur = prev;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Reciprocal;
    use voxtrace_core::{Calibration, Volume};

    #[test]
    fn monitor_cancels_every_step() {
        let token = CancelToken::new();
        let mut m = StepMonitor::start(&SearchConfig::default(), token.clone());
        assert!(matches!(m.poll(1), Poll::Continue));
        token.cancel();
        assert!(matches!(m.poll(3), Poll::Stop(ExitReason::Cancelled)));
    }

    #[test]
    fn monitor_times_out_on_check_boundary() {
        let cfg = SearchConfig::default()
            .with_timeout(Duration::ZERO)
            .with_check_interval(4);
        let mut m = StepMonitor::start(&cfg, CancelToken::new());
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(m.poll(3), Poll::Continue));
        assert!(matches!(m.poll(4), Poll::Stop(ExitReason::TimedOut)));
    }

    #[test]
    fn monitor_reports_after_interval() {
        let cfg = SearchConfig::default()
            .with_report_interval(Duration::ZERO)
            .with_check_interval(1);
        let mut m = StepMonitor::start(&cfg, CancelToken::new());
        assert!(matches!(m.poll(1), Poll::Report));
    }

    #[test]
    fn edge_cost_clamps_and_scales() {
        let c = Reciprocal::new(0.0, 255.0);
        let e = EdgeCost::new(&c);
        assert_eq!(e.unit(255.0), 1.0 / 255.0);
        assert_eq!(e.step(255.0, 2.0), 2.0 / 255.0);
        let v = Volume::from_fn(3, 1, 1, Calibration::default(), |_| 255.0).unwrap();
        let pts = [Point3::new(0, 0, 0), Point3::new(1, 0, 0), Point3::new(2, 0, 0)];
        assert!((e.along(&v, &pts) - 2.0 / 255.0).abs() < 1e-15);
    }

    #[test]
    fn status_display() {
        assert_eq!(SearchStatus::Failed(ExitReason::TimedOut).to_string(), "failed: timed out");
        assert!(SearchStatus::Succeeded.is_finished());
        assert!(!SearchStatus::Running.is_finished());
    }
}
