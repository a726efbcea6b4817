//! Trees of reached voxels, built from predecessor links.
//!
//! Nodes live in an arena and refer to each other by index; each node also
//! appears in a coordinate index so shared prefixes are stored once.

use std::collections::{HashMap, HashSet};

use voxtrace_core::{Calibration, Point3};

/// One vertex of a [`ResultTree`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeNode {
    pub point: Point3,
    /// Index of the node one step closer to the root.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Estimated local structure radius, in physical units.
    pub radius: Option<f64>,
}

/// A forest of voxels rooted at the fill seeds. Usually a single tree.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "TreeRepr", from = "TreeRepr")
)]
pub struct ResultTree {
    nodes: Vec<TreeNode>,
    index: HashMap<Point3, usize>,
    calibration: Calibration,
}

/// Serialised form of [`ResultTree`]; the coordinate index is rebuilt on load.
#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct TreeRepr {
    nodes: Vec<TreeNode>,
    calibration: Calibration,
}

#[cfg(feature = "serde")]
impl From<TreeRepr> for ResultTree {
    fn from(repr: TreeRepr) -> Self {
        Self {
            index: index_nodes(&repr.nodes),
            nodes: repr.nodes,
            calibration: repr.calibration,
        }
    }
}

#[cfg(feature = "serde")]
impl From<ResultTree> for TreeRepr {
    fn from(tree: ResultTree) -> Self {
        Self {
            nodes: tree.nodes,
            calibration: tree.calibration,
        }
    }
}

#[cfg(feature = "serde")]
fn index_nodes(nodes: &[TreeNode]) -> HashMap<Point3, usize> {
    nodes.iter().enumerate().map(|(i, n)| (n.point, i)).collect()
}

impl ResultTree {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            calibration,
        }
    }

    /// Build from `(point, predecessor)` pairs by backtracking from every
    /// leaf until an already placed node or a root is reached.
    ///
    /// Points without a predecessor become roots. A predecessor that is not
    /// itself among the pairs is treated as a root too.
    pub fn from_predecessors(
        reached: impl IntoIterator<Item = (Point3, Option<Point3>)>,
        calibration: Calibration,
    ) -> Self {
        let preds: HashMap<Point3, Option<Point3>> = reached.into_iter().collect();
        let referenced: HashSet<Point3> = preds.values().flatten().copied().collect();
        let mut leaves: Vec<Point3> = preds
            .keys()
            .filter(|p| !referenced.contains(p))
            .copied()
            .collect();
        leaves.sort_unstable();

        let mut tree = Self::new(calibration);
        let mut roots: Vec<Point3> = preds
            .iter()
            .filter(|(_, pred)| pred.is_none())
            .map(|(&p, _)| p)
            .collect();
        roots.sort_unstable();
        for r in roots {
            tree.add_root(r);
        }

        let mut chain = Vec::new();
        for leaf in leaves {
            chain.clear();
            let mut cur = leaf;
            // Walk up until we hit something already placed.
            let anchor = loop {
                if let Some(&i) = tree.index.get(&cur) {
                    break Some(i);
                }
                chain.push(cur);
                match preds.get(&cur).copied().flatten() {
                    Some(prev) if preds.contains_key(&prev) && chain.len() <= preds.len() => {
                        cur = prev;
                    }
                    _ => break None,
                }
            };
            let mut parent = match anchor {
                Some(i) => i,
                None => {
                    let Some(top) = chain.pop() else { continue };
                    tree.add_root(top)
                }
            };
            while let Some(p) = chain.pop() {
                parent = tree.add_child(parent, p);
            }
        }
        tree
    }

    /// Add a parentless node. Returns the existing index if `p` is present.
    pub fn add_root(&mut self, p: Point3) -> usize {
        if let Some(&i) = self.index.get(&p) {
            return i;
        }
        self.push(p, None)
    }

    /// Add `p` as a child of node `parent`. Returns the existing index if
    /// `p` is present.
    pub fn add_child(&mut self, parent: usize, p: Point3) -> usize {
        if let Some(&i) = self.index.get(&p) {
            return i;
        }
        let i = self.push(p, Some(parent));
        self.nodes[parent].children.push(i);
        i
    }

    fn push(&mut self, point: Point3, parent: Option<usize>) -> usize {
        let i = self.nodes.len();
        self.nodes.push(TreeNode {
            point,
            parent,
            children: Vec::new(),
            radius: None,
        });
        self.index.insert(point, i);
        i
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[inline]
    pub fn node(&self, i: usize) -> &TreeNode {
        &self.nodes[i]
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn index_of(&self, p: Point3) -> Option<usize> {
        self.index.get(&p).copied()
    }

    pub fn contains(&self, p: Point3) -> bool {
        self.index.contains_key(&p)
    }

    /// Indices of parentless nodes.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].parent.is_none())
            .collect()
    }

    /// First root, if any.
    pub fn root(&self) -> Option<usize> {
        self.nodes.iter().position(|n| n.parent.is_none())
    }

    /// Nodes without children.
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].children.is_empty())
            .collect()
    }

    /// Nodes with more than one child.
    pub fn branch_points(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].children.len() > 1)
            .collect()
    }

    /// `(child, parent)` coordinate pairs.
    pub fn edges(&self) -> impl Iterator<Item = (Point3, Point3)> + '_ {
        self.nodes
            .iter()
            .filter_map(|n| n.parent.map(|p| (n.point, self.nodes[p].point)))
    }

    /// Coordinates from node `i` up to its root.
    pub fn path_to_root(&self, i: usize) -> Vec<Point3> {
        let mut out = Vec::new();
        let mut cur = Some(i);
        while let Some(c) = cur {
            out.push(self.nodes[c].point);
            cur = self.nodes[c].parent;
        }
        out
    }

    /// Unbranched runs, each from a root or branch point down to the next
    /// branch point or leaf, both ends included.
    pub fn segments(&self) -> Vec<Vec<Point3>> {
        let mut out = Vec::new();
        for n in &self.nodes {
            let is_origin = n.parent.is_none() || n.children.len() > 1;
            if !is_origin {
                continue;
            }
            for &first in &n.children {
                let mut seg = vec![n.point];
                let mut cur = first;
                loop {
                    seg.push(self.nodes[cur].point);
                    match self.nodes[cur].children.as_slice() {
                        [only] => cur = *only,
                        _ => break,
                    }
                }
                out.push(seg);
            }
        }
        out
    }

    /// Sum of calibrated edge lengths.
    pub fn total_length(&self) -> f64 {
        self.edges()
            .map(|(a, b)| self.calibration.distance(a, b))
            .sum()
    }

    pub fn set_radius(&mut self, i: usize, radius: f64) {
        self.nodes[i].radius = Some(radius);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(x: i32, y: i32) -> Point3 {
        Point3::new(x, y, 0)
    }

    /// A "Y": root at (0,0), trunk to (2,0), branches to (4,2) and (4,-2).
    fn y_shape() -> Vec<(Point3, Option<Point3>)> {
        vec![
            (p(0, 0), None),
            (p(1, 0), Some(p(0, 0))),
            (p(2, 0), Some(p(1, 0))),
            (p(3, 1), Some(p(2, 0))),
            (p(4, 2), Some(p(3, 1))),
            (p(3, -1), Some(p(2, 0))),
            (p(4, -2), Some(p(3, -1))),
        ]
    }

    #[test]
    fn builds_deduplicated_tree() {
        let t = ResultTree::from_predecessors(y_shape(), Calibration::default());
        assert_eq!(t.len(), 7);
        assert_eq!(t.roots().len(), 1);
        assert_eq!(t.node(t.root().unwrap()).point, p(0, 0));
        assert_eq!(t.leaves().len(), 2);
        let bp = t.branch_points();
        assert_eq!(bp.len(), 1);
        assert_eq!(t.node(bp[0]).point, p(2, 0));
        assert_eq!(t.edges().count(), 6);
    }

    #[test]
    fn segments_split_at_branches() {
        let t = ResultTree::from_predecessors(y_shape(), Calibration::default());
        let mut segs = t.segments();
        segs.sort();
        assert_eq!(segs.len(), 3);
        assert!(segs.contains(&vec![p(0, 0), p(1, 0), p(2, 0)]));
        assert!(segs.contains(&vec![p(2, 0), p(3, 1), p(4, 2)]));
        assert!(segs.contains(&vec![p(2, 0), p(3, -1), p(4, -2)]));
    }

    #[test]
    fn lengths_and_paths() {
        let t = ResultTree::from_predecessors(y_shape(), Calibration::isotropic(2.0));
        assert_relative_eq!(t.total_length(), 2.0 * (2.0 + 4.0 * 2f64.sqrt()));
        let leaf = t.index_of(p(4, 2)).unwrap();
        assert_eq!(t.path_to_root(leaf), vec![p(4, 2), p(3, 1), p(2, 0), p(1, 0), p(0, 0)]);
    }

    #[test]
    fn multiple_roots_and_dangling_predecessors() {
        let t = ResultTree::from_predecessors(
            vec![
                (p(0, 0), None),
                (p(1, 0), Some(p(0, 0))),
                (p(9, 9), None),
                // Predecessor never reported: becomes a root.
                (p(5, 5), Some(p(5, 4))),
            ],
            Calibration::default(),
        );
        assert_eq!(t.roots().len(), 3);
        assert!(t.contains(p(5, 5)));
        assert!(!t.contains(p(5, 4)));
    }

    #[test]
    fn manual_building_and_radius() {
        let mut t = ResultTree::new(Calibration::default());
        let r = t.add_root(p(0, 0));
        let a = t.add_child(r, p(1, 0));
        assert_eq!(t.add_child(r, p(1, 0)), a);
        t.set_radius(a, 1.5);
        assert_eq!(t.node(a).radius, Some(1.5));
        assert_eq!(t.segments(), vec![vec![p(0, 0), p(1, 0)]]);
    }
}
