//! Open set ordered by `f = g + h`.
//!
//! Decrease-key is done by pushing a fresh entry; the search discards an
//! entry when it pops one whose node has since been closed or improved.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use voxtrace_core::Point3;

/// One frontier entry.
#[derive(Clone, Copy, Debug)]
pub struct OpenEntry {
    pub point: Point3,
    /// Priority, `g + h`.
    pub f: f64,
    /// Cost from the origin when the entry was pushed.
    pub g: f64,
    /// Cost of the edge that reached `point`.
    pub step_cost: f64,
}

impl OpenEntry {
    /// Whether a node currently holding `current_g` makes this entry stale.
    #[inline]
    pub fn is_stale(&self, current_g: f64) -> bool {
        current_g < self.g
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (max-heap) pops smallest f first. Equal f
        // goes to the cheaper incoming edge, then to the lower coordinate.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.step_cost.total_cmp(&self.step_cost))
            .then_with(|| other.point.cmp(&self.point))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Min-priority queue of [`OpenEntry`]s, one per search direction.
#[derive(Clone, Debug, Default)]
pub struct OpenSet {
    heap: BinaryHeap<OpenEntry>,
}

impl OpenSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, entry: OpenEntry) {
        self.heap.push(entry);
    }

    /// Remove and return the lowest-priority entry.
    #[inline]
    pub fn pop(&mut self) -> Option<OpenEntry> {
        self.heap.pop()
    }

    #[inline]
    pub fn peek(&self) -> Option<&OpenEntry> {
        self.heap.peek()
    }

    /// Priority of the best entry, `∞` when empty.
    #[inline]
    pub fn peek_f(&self) -> f64 {
        self.heap.peek().map_or(f64::INFINITY, |e| e.f)
    }

    /// Entries held, stale ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: i32, f: f64, step_cost: f64) -> OpenEntry {
        OpenEntry {
            point: Point3::new(x, 0, 0),
            f,
            g: f,
            step_cost,
        }
    }

    #[test]
    fn pops_lowest_f_first() {
        let mut s = OpenSet::new();
        s.push(entry(0, 5.0, 1.0));
        s.push(entry(1, 2.0, 1.0));
        s.push(entry(2, 9.0, 1.0));
        assert_eq!(s.peek_f(), 2.0);
        let order: Vec<i32> = std::iter::from_fn(|| s.pop()).map(|e| e.point.x).collect();
        assert_eq!(order, vec![1, 0, 2]);
        assert_eq!(s.peek_f(), f64::INFINITY);
    }

    #[test]
    fn equal_f_prefers_cheaper_edge_then_lower_point() {
        let mut s = OpenSet::new();
        s.push(entry(3, 4.0, 0.5));
        s.push(entry(1, 4.0, 0.9));
        s.push(entry(2, 4.0, 0.5));
        let order: Vec<i32> = std::iter::from_fn(|| s.pop()).map(|e| e.point.x).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn staleness() {
        let e = entry(0, 3.0, 1.0);
        assert!(e.is_stale(2.5));
        assert!(!e.is_stale(3.0));
    }
}
