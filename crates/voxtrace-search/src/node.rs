//! Per-voxel search state.
//!
//! A [`SearchNode`] is identified by the coordinate it is stored under and
//! never records that coordinate itself. Predecessors are coordinates, so the
//! predecessor graph lives entirely inside the storage backend.

use std::fmt;

use voxtrace_core::Point3;

/// The side of a search a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    FromStart,
    FromGoal,
}

impl Direction {
    #[inline]
    const fn slot(self) -> usize {
        match self {
            Self::FromStart => 0,
            Self::FromGoal => 1,
        }
    }

    /// The other side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Self::FromStart => Self::FromGoal,
            Self::FromGoal => Self::FromStart,
        }
    }
}

/// Lifecycle of a node with respect to one direction.
///
/// Transitions only go forward: `Free → Open → Closed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    #[default]
    Free,
    Open,
    Closed,
}

impl Phase {
    const fn to_bits(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Free),
            1 => Some(Self::Open),
            2 => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Combined status across both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeStatus {
    Free,
    OpenFromStart,
    ClosedFromStart,
    OpenFromGoal,
    ClosedFromGoal,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Free => "free",
            Self::OpenFromStart => "open from start",
            Self::ClosedFromStart => "closed from start",
            Self::OpenFromGoal => "open from goal",
            Self::ClosedFromGoal => "closed from goal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SearchNode
// ---------------------------------------------------------------------------

/// Mutable search state of one voxel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchNode {
    g: [f64; 2],
    predecessor: [Option<Point3>; 2],
    phase: [Phase; 2],
}

impl Default for SearchNode {
    fn default() -> Self {
        Self {
            g: [f64::INFINITY; 2],
            predecessor: [None; 2],
            phase: [Phase::Free; 2],
        }
    }
}

impl SearchNode {
    /// Bytes used by [`encode`](Self::encode).
    pub const ENCODED_LEN: usize = 1 + 1 + 2 * 8 + 2 * 12;

    /// Cost accumulated from the origin of `dir`, `∞` if never reached.
    #[inline]
    pub fn g(&self, dir: Direction) -> f64 {
        self.g[dir.slot()]
    }

    /// The voxel this one was reached from, in direction `dir`.
    #[inline]
    pub fn predecessor(&self, dir: Direction) -> Option<Point3> {
        self.predecessor[dir.slot()]
    }

    #[inline]
    pub fn phase(&self, dir: Direction) -> Phase {
        self.phase[dir.slot()]
    }

    /// Five-valued status. Closed wins over open, start over goal.
    pub fn status(&self) -> NodeStatus {
        match (self.phase[0], self.phase[1]) {
            (Phase::Closed, _) => NodeStatus::ClosedFromStart,
            (_, Phase::Closed) => NodeStatus::ClosedFromGoal,
            (Phase::Open, _) => NodeStatus::OpenFromStart,
            (_, Phase::Open) => NodeStatus::OpenFromGoal,
            (Phase::Free, Phase::Free) => NodeStatus::Free,
        }
    }

    /// Record a candidate cost. Accepted only if it improves `g` and the node
    /// is not yet closed in `dir`; an accepted offer leaves the node open.
    #[inline]
    pub fn offer(&mut self, dir: Direction, g: f64, predecessor: Option<Point3>) -> bool {
        let i = dir.slot();
        if self.phase[i] == Phase::Closed || g >= self.g[i] {
            return false;
        }
        self.g[i] = g;
        self.predecessor[i] = predecessor;
        self.phase[i] = Phase::Open;
        true
    }

    /// Mark the node closed in `dir`. Returns `false` if it already was.
    #[inline]
    pub fn close(&mut self, dir: Direction) -> bool {
        let i = dir.slot();
        if self.phase[i] == Phase::Closed {
            return false;
        }
        self.phase[i] = Phase::Closed;
        true
    }

    /// Whether both directions have closed this node.
    #[inline]
    pub fn is_closed_by_both(&self) -> bool {
        self.phase[0] == Phase::Closed && self.phase[1] == Phase::Closed
    }

    /// Whether any direction has reached this node.
    #[inline]
    pub fn is_reached(&self) -> bool {
        self.phase[0] != Phase::Free || self.phase[1] != Phase::Free
    }

    // -----------------------------------------------------------------------
    // Binary encoding
    // -----------------------------------------------------------------------
    //
    // [phases: u8]       start in bits 0-1, goal in bits 2-3
    // [preds:  u8]       bit 0 = start predecessor present, bit 1 = goal
    // [g_start: f64 LE] [g_goal: f64 LE]
    // [pred_start: 3 x i32 LE] [pred_goal: 3 x i32 LE]

    /// Append the fixed-size encoding to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.phase[0].to_bits() | (self.phase[1].to_bits() << 2));
        let mut preds = 0u8;
        for (i, p) in self.predecessor.iter().enumerate() {
            if p.is_some() {
                preds |= 1 << i;
            }
        }
        out.push(preds);
        for g in self.g {
            out.extend_from_slice(&g.to_le_bytes());
        }
        for p in self.predecessor {
            let p = p.unwrap_or_default();
            out.extend_from_slice(&p.x.to_le_bytes());
            out.extend_from_slice(&p.y.to_le_bytes());
            out.extend_from_slice(&p.z.to_le_bytes());
        }
    }

    /// Decode one node from the first [`ENCODED_LEN`](Self::ENCODED_LEN)
    /// bytes of `buf`. Returns `None` on short or malformed input.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return None;
        }
        let phases = buf[0];
        let preds = buf[1];
        let phase = [
            Phase::from_bits(phases & 0b11)?,
            Phase::from_bits((phases >> 2) & 0b11)?,
        ];
        let f64_at = |o: usize| buf[o..o + 8].try_into().ok().map(f64::from_le_bytes);
        let i32_at = |o: usize| buf[o..o + 4].try_into().ok().map(i32::from_le_bytes);
        let g = [f64_at(2)?, f64_at(10)?];
        let mut predecessor = [None; 2];
        for (i, slot) in predecessor.iter_mut().enumerate() {
            if preds & (1 << i) != 0 {
                let o = 18 + i * 12;
                *slot = Some(Point3::new(i32_at(o)?, i32_at(o + 4)?, i32_at(o + 8)?));
            }
        }
        Some(Self {
            g,
            predecessor,
            phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_only_improves() {
        let mut n = SearchNode::default();
        assert_eq!(n.status(), NodeStatus::Free);
        assert!(n.offer(Direction::FromStart, 5.0, Some(Point3::ZERO)));
        assert_eq!(n.status(), NodeStatus::OpenFromStart);
        assert!(!n.offer(Direction::FromStart, 6.0, Some(Point3::new(1, 0, 0))));
        assert_eq!(n.predecessor(Direction::FromStart), Some(Point3::ZERO));
        assert!(n.offer(Direction::FromStart, 4.0, Some(Point3::new(1, 0, 0))));
        assert_eq!(n.g(Direction::FromStart), 4.0);
        assert_eq!(n.g(Direction::FromGoal), f64::INFINITY);
    }

    #[test]
    fn closed_is_final() {
        let mut n = SearchNode::default();
        n.offer(Direction::FromStart, 2.0, None);
        assert!(n.close(Direction::FromStart));
        assert!(!n.close(Direction::FromStart));
        assert!(!n.offer(Direction::FromStart, 0.5, None));
        assert_eq!(n.g(Direction::FromStart), 2.0);
        assert_eq!(n.phase(Direction::FromStart), Phase::Closed);
        assert_eq!(n.status(), NodeStatus::ClosedFromStart);
    }

    #[test]
    fn both_directions() {
        let mut n = SearchNode::default();
        n.offer(Direction::FromGoal, 1.0, None);
        assert_eq!(n.status(), NodeStatus::OpenFromGoal);
        n.close(Direction::FromGoal);
        assert_eq!(n.status(), NodeStatus::ClosedFromGoal);
        n.offer(Direction::FromStart, 3.0, Some(Point3::new(1, 1, 1)));
        assert_eq!(n.status(), NodeStatus::ClosedFromGoal);
        assert!(!n.is_closed_by_both());
        n.close(Direction::FromStart);
        assert!(n.is_closed_by_both());
        assert_eq!(Direction::FromGoal.opposite(), Direction::FromStart);
    }

    #[test]
    fn encoding_is_fixed_size_and_lossless() {
        let mut n = SearchNode::default();
        n.offer(Direction::FromStart, 1.25, Some(Point3::new(-3, 7, 2)));
        n.close(Direction::FromStart);
        n.offer(Direction::FromGoal, 9.5, None);
        let mut buf = Vec::new();
        n.encode(&mut buf);
        SearchNode::default().encode(&mut buf);
        assert_eq!(buf.len(), 2 * SearchNode::ENCODED_LEN);
        assert_eq!(SearchNode::decode(&buf), Some(n));
        assert_eq!(
            SearchNode::decode(&buf[SearchNode::ENCODED_LEN..]),
            Some(SearchNode::default())
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(SearchNode::decode(&[0u8; 5]), None);
        let mut buf = vec![0u8; SearchNode::ENCODED_LEN];
        buf[0] = 0b11;
        assert_eq!(SearchNode::decode(&buf), None);
    }
}
