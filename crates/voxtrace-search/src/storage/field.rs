//! Per-voxel scalar values laid out like the node backends.
//!
//! A [`SliceField`] holds one value per voxel with a shared default for
//! voxels never written. The layout follows the resolved [`BackendKind`], so
//! a search that pages its nodes to disk pages its side tables too.

use std::collections::HashMap;

use voxtrace_core::{Bounds, Point3};

use super::pager::{PageRecord, SliceMap, SlicePager};
use super::{BackendKind, check_bounds, slice_slot};
use crate::error::Result;

#[derive(Debug)]
enum Layout<V> {
    /// Whole slices, allocated on first write.
    Dense(Vec<Option<Vec<V>>>),
    Sparse(Vec<SliceMap<V>>),
    Paged(SlicePager<V>),
}

/// Scalar field over a volume's bounds, stored per slice.
#[derive(Debug)]
pub(crate) struct SliceField<V> {
    bounds: Bounds,
    default: V,
    layout: Layout<V>,
}

impl<V: PageRecord> SliceField<V> {
    pub(crate) fn new(kind: BackendKind, bounds: Bounds, default: V, cache_slices: usize) -> Self {
        let depth = bounds.depth().max(0) as usize;
        let layout = match kind {
            BackendKind::Array => Layout::Dense(vec![None; depth]),
            BackendKind::Sparse => Layout::Sparse((0..depth).map(|_| HashMap::new()).collect()),
            BackendKind::Disk => Layout::Paged(SlicePager::new(bounds, cache_slices, "field")),
        };
        Self {
            bounds,
            default,
            layout,
        }
    }

    pub(crate) fn get(&mut self, p: Point3) -> Result<V> {
        check_bounds(self.bounds, p)?;
        let bounds = self.bounds;
        let slot = slice_slot(bounds, p.z);
        let value = match &mut self.layout {
            Layout::Dense(slices) => slices[slot]
                .as_ref()
                .and_then(|s| bounds.slice_index(p).map(|i| s[i])),
            Layout::Sparse(slices) => slices[slot].get(&(p.x, p.y)).copied(),
            Layout::Paged(pages) => {
                if pages.holds(p.z) {
                    pages.load(p.z)?.get(&(p.x, p.y)).copied()
                } else {
                    None
                }
            }
        };
        Ok(value.unwrap_or(self.default))
    }

    pub(crate) fn set(&mut self, p: Point3, value: V) -> Result<()> {
        check_bounds(self.bounds, p)?;
        let (bounds, default) = (self.bounds, self.default);
        let slot = slice_slot(bounds, p.z);
        match &mut self.layout {
            Layout::Dense(slices) => {
                let slice = slices[slot].get_or_insert_with(|| vec![default; bounds.slice_len()]);
                if let Some(i) = bounds.slice_index(p) {
                    slice[i] = value;
                }
            }
            Layout::Sparse(slices) => {
                slices[slot].insert((p.x, p.y), value);
            }
            Layout::Paged(pages) => {
                pages.load(p.z)?.insert((p.x, p.y), value);
            }
        }
        Ok(())
    }

    /// Approximate bytes of values held in memory.
    pub(crate) fn estimated_bytes(&self) -> u64 {
        let value = std::mem::size_of::<V>() as u64;
        let entry = (std::mem::size_of::<(i32, i32)>() + 8) as u64 + value;
        match &self.layout {
            Layout::Dense(slices) => {
                slices.iter().flatten().map(|s| s.len() as u64).sum::<u64>() * value
            }
            Layout::Sparse(slices) => slices.iter().map(|m| m.len() as u64).sum::<u64>() * entry,
            Layout::Paged(pages) => pages.resident_entries() * entry,
        }
    }

    /// Forget every value and remove page files.
    pub(crate) fn dispose(&mut self) -> Result<()> {
        match &mut self.layout {
            Layout::Dense(slices) => slices.iter_mut().for_each(|s| *s = None),
            Layout::Sparse(slices) => slices.iter_mut().for_each(HashMap::clear),
            Layout::Paged(pages) => pages.clear()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [BackendKind; 3] = [BackendKind::Array, BackendKind::Sparse, BackendKind::Disk];

    #[test]
    fn every_layout_reads_back_writes() {
        let bounds = Bounds::from_dims(5, 4, 6);
        for kind in KINDS {
            let mut f = SliceField::new(kind, bounds, -1.0f32, 2);
            assert_eq!(f.get(Point3::new(2, 2, 2)).unwrap(), -1.0, "{kind}");
            for z in 0..6 {
                f.set(Point3::new(z % 5, 3, z), z as f32).unwrap();
            }
            for z in 0..6 {
                assert_eq!(f.get(Point3::new(z % 5, 3, z)).unwrap(), z as f32, "{kind}");
                assert_eq!(f.get(Point3::new(0, 0, z)).unwrap(), -1.0, "{kind}");
            }
            assert!(f.set(Point3::new(5, 0, 0), 1.0).is_err());
            assert!(f.get(Point3::new(0, 0, 6)).is_err());

            f.dispose().unwrap();
            assert_eq!(f.get(Point3::new(1, 3, 1)).unwrap(), -1.0, "{kind}");
            assert_eq!(f.estimated_bytes(), 0, "{kind}");
        }
    }

    #[test]
    fn paged_layout_keeps_only_cached_slices_in_memory() {
        let bounds = Bounds::from_dims(16, 16, 12);
        let mut dense = SliceField::new(BackendKind::Array, bounds, false, 1);
        let mut paged = SliceField::new(BackendKind::Disk, bounds, false, 1);
        for p in bounds.iter() {
            dense.set(p, true).unwrap();
            paged.set(p, true).unwrap();
        }
        assert_eq!(dense.estimated_bytes(), 16 * 16 * 12);
        // One resident slice of 256 entries.
        assert!(paged.estimated_bytes() <= 256 * 32);
        assert!(bounds.iter().all(|p| paged.get(p).unwrap()));
    }
}
