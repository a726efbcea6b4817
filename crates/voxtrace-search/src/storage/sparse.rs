use std::collections::HashMap;

use voxtrace_core::{Bounds, Point3};

use super::{BackendKind, MAP_ENTRY_BYTES, SearchImage, SliceIter, check_bounds, slice_slot};
use crate::error::Result;
use crate::node::SearchNode;

/// One hash map per z-slice keyed by (x, y). Only visited voxels cost
/// memory.
#[derive(Debug)]
pub struct SparseStorage {
    bounds: Bounds,
    slices: Vec<HashMap<(i32, i32), SearchNode>>,
}

impl SparseStorage {
    pub fn new(bounds: Bounds) -> Self {
        let depth = bounds.depth().max(0) as usize;
        Self {
            bounds,
            slices: (0..depth).map(|_| HashMap::new()).collect(),
        }
    }
}

/// Sorted snapshot of one slice map.
pub(super) fn snapshot(map: &HashMap<(i32, i32), SearchNode>, z: i32) -> SliceIter {
    let mut nodes: Vec<_> = map
        .iter()
        .map(|(&(x, y), &n)| (Point3::new(x, y, z), n))
        .collect();
    nodes.sort_unstable_by_key(|(p, _)| *p);
    nodes.into_iter()
}

impl SearchImage for SparseStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Sparse
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn get(&mut self, p: Point3) -> Result<Option<&SearchNode>> {
        check_bounds(self.bounds, p)?;
        Ok(self.slices[slice_slot(self.bounds, p.z)].get(&(p.x, p.y)))
    }

    fn get_or_create(&mut self, p: Point3) -> Result<&mut SearchNode> {
        check_bounds(self.bounds, p)?;
        Ok(self.slices[slice_slot(self.bounds, p.z)]
            .entry((p.x, p.y))
            .or_default())
    }

    fn slice_iter(&mut self, z: i32) -> Result<SliceIter> {
        check_bounds(self.bounds, Point3::new(self.bounds.min.x, self.bounds.min.y, z))?;
        Ok(snapshot(&self.slices[slice_slot(self.bounds, z)], z))
    }

    fn occupied_slices(&self) -> Vec<i32> {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_empty())
            .map(|(i, _)| i as i32 + self.bounds.min.z)
            .collect()
    }

    fn node_count(&self) -> usize {
        self.slices.iter().map(HashMap::len).sum()
    }

    fn estimated_bytes(&self) -> u64 {
        self.node_count() as u64 * MAP_ENTRY_BYTES
    }

    fn dispose(&mut self) -> Result<()> {
        for m in &mut self.slices {
            *m = HashMap::new();
        }
        Ok(())
    }
}
