use voxtrace_core::{Bounds, Point3};

use super::{BackendKind, SearchImage, SliceIter, check_bounds, slice_slot};
use crate::error::Result;
use crate::node::SearchNode;

/// One flat vector per z-slice, allocated the first time the slice is
/// touched. Constant-time access; memory grows a whole slice at a time.
#[derive(Debug)]
pub struct ArrayStorage {
    bounds: Bounds,
    slices: Vec<Option<Vec<Option<SearchNode>>>>,
    count: usize,
}

impl ArrayStorage {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            slices: vec![None; bounds.depth().max(0) as usize],
            count: 0,
        }
    }

    fn within_slice(&self, p: Point3) -> usize {
        (p.y - self.bounds.min.y) as usize * self.bounds.width() as usize
            + (p.x - self.bounds.min.x) as usize
    }
}

impl SearchImage for ArrayStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Array
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn get(&mut self, p: Point3) -> Result<Option<&SearchNode>> {
        check_bounds(self.bounds, p)?;
        let i = self.within_slice(p);
        Ok(self.slices[slice_slot(self.bounds, p.z)]
            .as_ref()
            .and_then(|s| s[i].as_ref()))
    }

    fn get_or_create(&mut self, p: Point3) -> Result<&mut SearchNode> {
        check_bounds(self.bounds, p)?;
        let i = self.within_slice(p);
        let len = self.bounds.slice_len();
        let slice = self.slices[slice_slot(self.bounds, p.z)].get_or_insert_with(|| vec![None; len]);
        let cell = &mut slice[i];
        if cell.is_none() {
            self.count += 1;
        }
        Ok(cell.get_or_insert_with(SearchNode::default))
    }

    fn slice_iter(&mut self, z: i32) -> Result<SliceIter> {
        check_bounds(self.bounds, Point3::new(self.bounds.min.x, self.bounds.min.y, z))?;
        let w = self.bounds.width().max(1) as usize;
        let min = self.bounds.min;
        let nodes: Vec<_> = match &self.slices[slice_slot(self.bounds, z)] {
            Some(slice) => slice
                .iter()
                .enumerate()
                .filter_map(|(i, n)| {
                    n.map(|n| (Point3::new((i % w) as i32 + min.x, (i / w) as i32 + min.y, z), n))
                })
                .collect(),
            None => Vec::new(),
        };
        Ok(nodes.into_iter())
    }

    fn occupied_slices(&self) -> Vec<i32> {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_ref().is_some_and(|s| s.iter().any(Option::is_some)))
            .map(|(i, _)| i as i32 + self.bounds.min.z)
            .collect()
    }

    fn node_count(&self) -> usize {
        self.count
    }

    fn estimated_bytes(&self) -> u64 {
        let allocated = self.slices.iter().filter(|s| s.is_some()).count() as u64;
        allocated * self.bounds.slice_len() as u64 * std::mem::size_of::<Option<SearchNode>>() as u64
    }

    fn dispose(&mut self) -> Result<()> {
        self.slices.iter_mut().for_each(|s| *s = None);
        self.count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_allocate_lazily() {
        let mut a = ArrayStorage::new(Bounds::from_dims(10, 10, 5));
        assert_eq!(a.estimated_bytes(), 0);
        a.get_or_create(Point3::new(3, 3, 2)).unwrap();
        let one = a.estimated_bytes();
        assert!(one >= 100);
        a.get_or_create(Point3::new(9, 9, 2)).unwrap();
        assert_eq!(a.estimated_bytes(), one);
        a.get_or_create(Point3::new(0, 0, 4)).unwrap();
        assert_eq!(a.estimated_bytes(), 2 * one);
    }

    #[test]
    fn offset_bounds() {
        let b = Bounds::new(Point3::new(10, 20, 30), Point3::new(13, 22, 32));
        let mut a = ArrayStorage::new(b);
        a.get_or_create(Point3::new(12, 21, 31)).unwrap();
        let got: Vec<_> = a.slice_iter(31).unwrap().map(|(p, _)| p).collect();
        assert_eq!(got, vec![Point3::new(12, 21, 31)]);
        assert_eq!(a.occupied_slices(), vec![31]);
    }
}
