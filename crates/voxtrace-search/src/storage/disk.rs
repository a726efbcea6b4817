//! Disk-paged node storage.
//!
//! Slices are kept as hash maps while resident. When more than `capacity`
//! slices are resident the least recently used one is written to a page file
//! in a private temporary directory and dropped from memory; touching it again
//! reads it back. Paging itself lives in [`SlicePager`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use voxtrace_core::{Bounds, Point3};

use super::pager::{PageRecord, SlicePager};
use super::sparse::snapshot;
use super::{BackendKind, MAP_ENTRY_BYTES, SearchImage, SliceIter, check_bounds};
use crate::error::Result;
use crate::node::SearchNode;

impl PageRecord for SearchNode {
    const ENCODED_LEN: usize = SearchNode::ENCODED_LEN;

    fn encode(&self, out: &mut Vec<u8>) {
        SearchNode::encode(self, out);
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        SearchNode::decode(bytes)
    }
}

/// Slices paged through a bounded LRU cache.
#[derive(Debug)]
pub struct DiskStorage {
    bounds: Bounds,
    pages: SlicePager<SearchNode>,
    // Node count per slice, resident or not.
    counts: HashMap<i32, usize>,
}

impl DiskStorage {
    /// Keep at most `capacity` slices in memory (at least one). Pages go to a
    /// fresh directory under the system temp dir, created on first eviction.
    pub fn new(bounds: Bounds, capacity: usize) -> Self {
        Self {
            bounds,
            pages: SlicePager::new(bounds, capacity, "nodes"),
            counts: HashMap::new(),
        }
    }

    /// Like [`new`](Self::new) but places the page directory under `parent`.
    pub fn new_in(bounds: Bounds, capacity: usize, parent: impl Into<PathBuf>) -> Self {
        let mut s = Self::new(bounds, capacity);
        s.pages.set_parent_dir(parent.into());
        s
    }

    /// Maximum number of resident slices.
    pub fn capacity(&self) -> usize {
        self.pages.capacity()
    }

    /// Number of slices currently in memory.
    pub fn resident_slices(&self) -> usize {
        self.pages.resident_slices()
    }

    /// Number of slices loaded back from disk so far.
    pub fn page_ins(&self) -> u64 {
        self.pages.page_ins()
    }

    /// Number of slices written out so far.
    pub fn page_outs(&self) -> u64 {
        self.pages.page_outs()
    }

    /// The page directory, once something has been paged out.
    pub fn page_dir(&self) -> Option<&Path> {
        self.pages.page_dir()
    }

    fn has_nodes(&self, z: i32) -> bool {
        self.counts.get(&z).is_some_and(|&c| c > 0)
    }
}

impl SearchImage for DiskStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn get(&mut self, p: Point3) -> Result<Option<&SearchNode>> {
        check_bounds(self.bounds, p)?;
        if !self.has_nodes(p.z) {
            return Ok(None);
        }
        let map = self.pages.load(p.z)?;
        Ok(map.get(&(p.x, p.y)))
    }

    fn get_or_create(&mut self, p: Point3) -> Result<&mut SearchNode> {
        check_bounds(self.bounds, p)?;
        let is_new = !self.pages.load(p.z)?.contains_key(&(p.x, p.y));
        if is_new {
            *self.counts.entry(p.z).or_default() += 1;
        }
        Ok(self.pages.load(p.z)?.entry((p.x, p.y)).or_default())
    }

    fn slice_iter(&mut self, z: i32) -> Result<SliceIter> {
        check_bounds(self.bounds, Point3::new(self.bounds.min.x, self.bounds.min.y, z))?;
        if !self.has_nodes(z) {
            return Ok(Vec::new().into_iter());
        }
        let map = self.pages.load(z)?;
        Ok(snapshot(map, z))
    }

    fn occupied_slices(&self) -> Vec<i32> {
        let mut zs: Vec<i32> = self
            .counts
            .iter()
            .filter(|&(_, &c)| c > 0)
            .map(|(&z, _)| z)
            .collect();
        zs.sort_unstable();
        zs
    }

    fn node_count(&self) -> usize {
        self.counts.values().sum()
    }

    fn estimated_bytes(&self) -> u64 {
        self.pages.resident_entries() * MAP_ENTRY_BYTES
    }

    fn dispose(&mut self) -> Result<()> {
        self.counts.clear();
        self.pages.clear()
    }
}
