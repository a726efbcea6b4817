//! LRU cache of per-slice hash maps, paged to a private temporary directory.
//!
//! ## Page format
//!
//! ```text
//! [record_count: u32 LE]
//! for each record:
//!   [x: i32 LE] [y: i32 LE]
//!   [value: V::ENCODED_LEN bytes]
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use voxtrace_core::{Bounds, Point3};

use crate::error::{Result, SearchError};

/// A fixed-width value that can be written to a page.
pub(crate) trait PageRecord: Copy + Send {
    const ENCODED_LEN: usize;

    fn encode(&self, out: &mut Vec<u8>);

    fn decode(bytes: &[u8]) -> Option<Self>;
}

impl PageRecord for f32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        Some(f32::from_le_bytes(bytes.try_into().ok()?))
    }
}

impl PageRecord for bool {
    const ENCODED_LEN: usize = 1;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }
}

pub(crate) type SliceMap<V> = HashMap<(i32, i32), V>;

#[derive(Debug)]
pub(crate) struct SlicePager<V> {
    bounds: Bounds,
    capacity: usize,
    label: &'static str,
    parent_dir: Option<PathBuf>,
    dir: Option<TempDir>,
    resident: HashMap<i32, SliceMap<V>>,
    // Front is least recently used.
    recency: VecDeque<i32>,
    paged: HashSet<i32>,
    page_ins: u64,
    page_outs: u64,
}

impl<V: PageRecord> SlicePager<V> {
    /// Keep at most `capacity` slices in memory (at least one). `label` names
    /// the page directory and the debug log line.
    pub(crate) fn new(bounds: Bounds, capacity: usize, label: &'static str) -> Self {
        Self {
            bounds,
            capacity: capacity.max(1),
            label,
            parent_dir: None,
            dir: None,
            resident: HashMap::new(),
            recency: VecDeque::new(),
            paged: HashSet::new(),
            page_ins: 0,
            page_outs: 0,
        }
    }

    pub(crate) fn set_parent_dir(&mut self, parent: PathBuf) {
        self.parent_dir = Some(parent);
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn resident_slices(&self) -> usize {
        self.resident.len()
    }

    pub(crate) fn page_ins(&self) -> u64 {
        self.page_ins
    }

    pub(crate) fn page_outs(&self) -> u64 {
        self.page_outs
    }

    pub(crate) fn page_dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Whether slice `z` has ever been loaded and not discarded.
    pub(crate) fn holds(&self, z: i32) -> bool {
        self.resident.contains_key(&z) || self.paged.contains(&z)
    }

    /// Entries currently in memory.
    pub(crate) fn resident_entries(&self) -> u64 {
        self.resident.values().map(|m| m.len() as u64).sum()
    }

    fn page_path(&mut self, z: i32) -> Result<PathBuf> {
        if self.dir.is_none() {
            let mut builder = tempfile::Builder::new();
            let prefix = format!("voxtrace-{}-", self.label);
            builder.prefix(&prefix);
            let dir = match &self.parent_dir {
                Some(parent) => builder.tempdir_in(parent)?,
                None => builder.tempdir()?,
            };
            log::debug!("paging {} to {}", self.label, dir.path().display());
            self.dir = Some(dir);
        }
        match &self.dir {
            Some(dir) => Ok(dir.path().join(format!("slice-{z}.bin"))),
            None => Err(SearchError::InvalidConfig("page directory unavailable".into())),
        }
    }

    fn touch(&mut self, z: i32) {
        if let Some(pos) = self.recency.iter().position(|&s| s == z) {
            self.recency.remove(pos);
        }
        self.recency.push_back(z);
    }

    fn write_page(&mut self, z: i32, map: &SliceMap<V>) -> Result<()> {
        let path = self.page_path(z)?;
        let mut w = BufWriter::new(File::create(&path)?);
        w.write_all(&(map.len() as u32).to_le_bytes())?;
        let mut buf = Vec::with_capacity(V::ENCODED_LEN);
        for (&(x, y), value) in map {
            w.write_all(&x.to_le_bytes())?;
            w.write_all(&y.to_le_bytes())?;
            buf.clear();
            value.encode(&mut buf);
            w.write_all(&buf)?;
        }
        w.flush()?;
        self.page_outs += 1;
        Ok(())
    }

    fn read_page(&mut self, z: i32) -> Result<SliceMap<V>> {
        let record_size = 8 + V::ENCODED_LEN;
        let path = self.page_path(z)?;
        let mut r = BufReader::new(File::open(&path)?);
        let corrupt = |reason: &str| SearchError::CorruptPage {
            z,
            reason: reason.to_string(),
        };

        let mut len_buf = [0u8; 4];
        r.read_exact(&mut len_buf)?;
        let count = u32::from_le_bytes(len_buf) as usize;
        if count > self.bounds.slice_len() {
            return Err(corrupt("record count exceeds slice size"));
        }

        let mut data = Vec::with_capacity(count * record_size);
        r.read_to_end(&mut data)?;
        if data.len() != count * record_size {
            return Err(corrupt("page length does not match record count"));
        }

        let mut map = SliceMap::with_capacity(count);
        for rec in data.chunks_exact(record_size) {
            let x = i32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]);
            let y = i32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]);
            if !self.bounds.contains(Point3::new(x, y, z)) {
                return Err(corrupt("record outside volume bounds"));
            }
            let value = V::decode(&rec[8..]).ok_or_else(|| corrupt("bad record"))?;
            map.insert((x, y), value);
        }
        self.page_ins += 1;
        Ok(map)
    }

    fn evict_lru(&mut self) -> Result<()> {
        let Some(z) = self.recency.pop_front() else {
            return Ok(());
        };
        if let Some(map) = self.resident.remove(&z) {
            if map.is_empty() {
                self.paged.remove(&z);
            } else {
                self.write_page(z, &map)?;
                self.paged.insert(z);
            }
        }
        Ok(())
    }

    /// Make slice `z` resident, paging others out as needed.
    pub(crate) fn load(&mut self, z: i32) -> Result<&mut SliceMap<V>> {
        if self.resident.contains_key(&z) {
            self.touch(z);
        } else {
            while self.resident.len() >= self.capacity {
                self.evict_lru()?;
            }
            let map = if self.paged.contains(&z) {
                self.read_page(z)?
            } else {
                SliceMap::new()
            };
            self.resident.insert(z, map);
            self.recency.push_back(z);
        }
        Ok(self.resident.entry(z).or_default())
    }

    /// Drop every slice and remove the page directory.
    pub(crate) fn clear(&mut self) -> Result<()> {
        self.resident.clear();
        self.recency.clear();
        self.paged.clear();
        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        Ok(())
    }
}
