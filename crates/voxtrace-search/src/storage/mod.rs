//! Coordinate-addressed storage of [`SearchNode`]s.
//!
//! Every search owns exactly one [`SearchImage`] and only ever talks to it
//! through the trait. Nodes are partitioned by z-slice in all three
//! implementations:
//!
//! | Backend | Per-slice layout | Memory |
//! |---|---|---|
//! | [`ArrayStorage`] | flat `Vec`, allocated on first touch | whole slice |
//! | [`SparseStorage`] | `HashMap` keyed by (x, y) | visited voxels only |
//! | [`DiskStorage`] | `HashMap`, LRU-paged to a temp dir | resident slices only |
//!
//! [`BackendFactory`] picks one from the estimated working-set size. Per-voxel
//! side tables of the tracer use the same three layouts, and the disk layout
//! shares one LRU pager with [`DiskStorage`].

mod array;
mod disk;
mod factory;
mod field;
mod pager;
mod sparse;

use std::fmt;

use voxtrace_core::{Bounds, Point3};

use crate::error::{Result, SearchError};
use crate::node::SearchNode;

pub use array::ArrayStorage;
pub use disk::DiskStorage;
pub use factory::{
    BYTES_PER_VOXEL_ESTIMATE, BackendChoice, BackendFactory, MemoryBudget, Thresholds,
    estimate_working_bytes,
};
pub use sparse::SparseStorage;

pub(crate) use field::SliceField;

/// Nodes of one slice, ordered by y then x.
pub type SliceIter = std::vec::IntoIter<(Point3, SearchNode)>;

/// Which storage implementation is in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendKind {
    Array,
    Sparse,
    Disk,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => f.write_str("array"),
            Self::Sparse => f.write_str("sparse"),
            Self::Disk => f.write_str("disk"),
        }
    }
}

/// Arena of search nodes addressed by voxel coordinate.
///
/// Lookups take `&mut self` because a paging backend may need to load the
/// requested slice first. Coordinates outside [`bounds`](Self::bounds) are
/// rejected with [`SearchError::InvalidCoordinate`] and never allocate.
pub trait SearchImage: Send {
    fn kind(&self) -> BackendKind;

    /// The voxel extent nodes may be created in.
    fn bounds(&self) -> Bounds;

    /// The node at `p`, if one has been created.
    fn get(&mut self, p: Point3) -> Result<Option<&SearchNode>>;

    /// The node at `p`, created in its default (free) state on first access.
    /// Repeated calls address the same node.
    fn get_or_create(&mut self, p: Point3) -> Result<&mut SearchNode>;

    /// Snapshot of every node created in slice `z`.
    fn slice_iter(&mut self, z: i32) -> Result<SliceIter>;

    /// Slices holding at least one node, ascending.
    fn occupied_slices(&self) -> Vec<i32>;

    /// Number of nodes created so far.
    fn node_count(&self) -> usize;

    /// Approximate bytes of node storage currently held in memory.
    fn estimated_bytes(&self) -> u64;

    /// Release all nodes and any temporary files. The image is empty but
    /// usable afterwards.
    fn dispose(&mut self) -> Result<()>;
}

impl<S: SearchImage + ?Sized> SearchImage for Box<S> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn bounds(&self) -> Bounds {
        (**self).bounds()
    }

    fn get(&mut self, p: Point3) -> Result<Option<&SearchNode>> {
        (**self).get(p)
    }

    fn get_or_create(&mut self, p: Point3) -> Result<&mut SearchNode> {
        (**self).get_or_create(p)
    }

    fn slice_iter(&mut self, z: i32) -> Result<SliceIter> {
        (**self).slice_iter(z)
    }

    fn occupied_slices(&self) -> Vec<i32> {
        (**self).occupied_slices()
    }

    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn estimated_bytes(&self) -> u64 {
        (**self).estimated_bytes()
    }

    fn dispose(&mut self) -> Result<()> {
        (**self).dispose()
    }
}

#[inline]
pub(crate) fn check_bounds(bounds: Bounds, p: Point3) -> Result<()> {
    if bounds.contains(p) {
        Ok(())
    } else {
        Err(SearchError::invalid_coordinate(p, bounds))
    }
}

/// Slot of slice `z` in a per-slice vector. Caller has checked bounds.
#[inline]
pub(crate) fn slice_slot(bounds: Bounds, z: i32) -> usize {
    (z - bounds.min.z) as usize
}

/// Rough heap cost of one hash-map entry holding a node.
pub(crate) const MAP_ENTRY_BYTES: u64 =
    (std::mem::size_of::<(i32, i32)>() + std::mem::size_of::<SearchNode>() + 8) as u64;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Direction;

    fn backends(bounds: Bounds) -> Vec<Box<dyn SearchImage>> {
        vec![
            Box::new(ArrayStorage::new(bounds)),
            Box::new(SparseStorage::new(bounds)),
            Box::new(DiskStorage::new(bounds, 2)),
        ]
    }

    #[test]
    fn all_backends_share_the_contract() {
        let bounds = Bounds::from_dims(6, 5, 4);
        for mut img in backends(bounds) {
            let kind = img.kind();
            assert_eq!(img.bounds(), bounds);
            assert!(img.get(Point3::new(1, 1, 1)).unwrap().is_none(), "{kind}");

            let n = img.get_or_create(Point3::new(1, 1, 1)).unwrap();
            n.offer(Direction::FromStart, 3.0, Some(Point3::new(0, 1, 1)));
            // Same node on the second lookup.
            let again = img.get_or_create(Point3::new(1, 1, 1)).unwrap();
            assert_eq!(again.g(Direction::FromStart), 3.0, "{kind}");

            img.get_or_create(Point3::new(4, 0, 1)).unwrap();
            img.get_or_create(Point3::new(0, 3, 1)).unwrap();
            img.get_or_create(Point3::new(2, 2, 3)).unwrap();
            assert_eq!(img.node_count(), 4, "{kind}");
            assert_eq!(img.occupied_slices(), vec![1, 3], "{kind}");

            let slice: Vec<Point3> = img.slice_iter(1).unwrap().map(|(p, _)| p).collect();
            assert_eq!(
                slice,
                vec![Point3::new(4, 0, 1), Point3::new(1, 1, 1), Point3::new(0, 3, 1)],
                "{kind}"
            );
            assert_eq!(img.slice_iter(2).unwrap().count(), 0, "{kind}");

            img.dispose().unwrap();
            assert_eq!(img.node_count(), 0, "{kind}");
            assert!(img.get(Point3::new(1, 1, 1)).unwrap().is_none(), "{kind}");
        }
    }

    #[test]
    fn out_of_bounds_is_rejected_without_allocating() {
        let bounds = Bounds::from_dims(3, 3, 3);
        for mut img in backends(bounds) {
            for p in [Point3::new(3, 0, 0), Point3::new(0, -1, 0), Point3::new(0, 0, 3)] {
                let err = img.get_or_create(p).unwrap_err();
                assert!(err.is_invalid_coordinate());
                assert!(img.get(p).is_err());
            }
            assert!(img.slice_iter(7).is_err());
            assert_eq!(img.node_count(), 0);
            assert_eq!(img.estimated_bytes(), 0);
        }
    }
}
