//! One direction of a best-first search: its open set, counters and the
//! expansion step every search mode shares.

use voxtrace_core::{IntensitySource, Point3};

use crate::connectivity::NeighborTable;
use crate::cost::Cost;
use crate::error::Result;
use crate::node::{Direction, Phase};
use crate::scheduler::{OpenEntry, OpenSet};
use crate::search::EdgeCost;
use crate::storage::SearchImage;

pub(crate) struct Frontier {
    pub(crate) dir: Direction,
    open: OpenSet,
    pub(crate) open_nodes: usize,
    pub(crate) closed_nodes: usize,
}

impl Frontier {
    pub(crate) fn new(dir: Direction) -> Self {
        Self {
            dir,
            open: OpenSet::new(),
            open_nodes: 0,
            closed_nodes: 0,
        }
    }

    /// Open `p` at cost zero with priority `h`.
    pub(crate) fn seed(&mut self, storage: &mut dyn SearchImage, p: Point3, h: f64) -> Result<()> {
        let node = storage.get_or_create(p)?;
        let was_free = node.phase(self.dir) == Phase::Free;
        if node.offer(self.dir, 0.0, None) {
            if was_free {
                self.open_nodes += 1;
            }
            self.open.push(OpenEntry {
                point: p,
                f: h,
                g: 0.0,
                step_cost: 0.0,
            });
        }
        Ok(())
    }

    fn is_live(&self, storage: &mut dyn SearchImage, e: &OpenEntry) -> Result<bool> {
        Ok(storage
            .get(e.point)?
            .is_some_and(|n| n.phase(self.dir) == Phase::Open && !e.is_stale(n.g(self.dir))))
    }

    /// Drop stale entries from the top of the open set.
    fn prune(&mut self, storage: &mut dyn SearchImage) -> Result<()> {
        while let Some(e) = self.open.peek().copied() {
            if self.is_live(storage, &e)? {
                break;
            }
            self.open.pop();
        }
        Ok(())
    }

    /// Best live entry without removing it.
    pub(crate) fn peek_live(&mut self, storage: &mut dyn SearchImage) -> Result<Option<OpenEntry>> {
        self.prune(storage)?;
        Ok(self.open.peek().copied())
    }

    /// Remove and return the best live entry.
    pub(crate) fn pop_live(&mut self, storage: &mut dyn SearchImage) -> Result<Option<OpenEntry>> {
        self.prune(storage)?;
        Ok(self.open.pop())
    }

    /// Close the node of a popped entry.
    pub(crate) fn close(&mut self, storage: &mut dyn SearchImage, p: Point3) -> Result<bool> {
        let node = storage.get_or_create(p)?;
        let closed = node.close(self.dir);
        if closed {
            self.open_nodes = self.open_nodes.saturating_sub(1);
            self.closed_nodes += 1;
        }
        Ok(closed)
    }

    /// Relax every admitted neighbour of `from`.
    ///
    /// `admit` filters neighbours (e.g. foreground only); `h` gives the
    /// priority offset of a point.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn expand<S, C>(
        &mut self,
        storage: &mut dyn SearchImage,
        table: &mut NeighborTable,
        source: &S,
        edge: &EdgeCost<'_, C>,
        from: &OpenEntry,
        admit: impl Fn(Point3) -> bool,
        h: impl Fn(Point3) -> f64,
    ) -> Result<()>
    where
        S: IntensitySource + ?Sized,
        C: Cost + ?Sized,
    {
        let bounds = storage.bounds();
        for &(np, len) in table.around(from.point, bounds) {
            if !admit(np) {
                continue;
            }
            let node = storage.get_or_create(np)?;
            if node.phase(self.dir) == Phase::Closed {
                continue;
            }
            let step = edge.step(source.value(np), len);
            let g = from.g + step;
            let was_free = node.phase(self.dir) == Phase::Free;
            if node.offer(self.dir, g, Some(from.point)) {
                if was_free {
                    self.open_nodes += 1;
                }
                self.open.push(OpenEntry {
                    point: np,
                    f: g + h(np),
                    g,
                    step_cost: step,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.open.clear();
        self.open_nodes = 0;
        self.closed_nodes = 0;
    }
}
