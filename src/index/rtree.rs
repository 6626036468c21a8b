//! R-tree variant backed by `rstar`.

use crate::assign::envelope_of;
use crate::geometry::{GeometryHandle, SpatialGeometry};
use geoshard_types::BoundingBox;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use std::fmt;

/// A handle stored in the tree together with its position in the partition.
struct IndexedGeometry<G> {
    position: usize,
    handle: GeometryHandle<G>,
}

impl<G> RTreeObject for IndexedGeometry<G> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(self.handle.bbox())
    }
}

impl<G: SpatialGeometry> PointDistance for IndexedGeometry<G> {
    // Exact geometry distance, so the tree's nearest-neighbour iteration is
    // ordered by true distance rather than by envelope distance.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let d = self.handle.geometry().distance_to_point(point[0], point[1]);
        d * d
    }
}

/// Bounding-box hierarchy, bulk loaded once.
pub struct RTreeIndex<G> {
    tree: RTree<IndexedGeometry<G>>,
    handles: Vec<GeometryHandle<G>>,
}

impl<G> fmt::Debug for RTreeIndex<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTreeIndex")
            .field("len", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl<G: SpatialGeometry> RTreeIndex<G> {
    pub(crate) fn bulk_load(handles: Vec<GeometryHandle<G>>) -> Self {
        let items: Vec<IndexedGeometry<G>> = handles
            .iter()
            .enumerate()
            .map(|(position, handle)| IndexedGeometry {
                position,
                handle: handle.clone(),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            handles,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub(crate) fn handle(&self, position: usize) -> Option<&GeometryHandle<G>> {
        self.handles.get(position)
    }

    pub(crate) fn query(&self, bbox: &BoundingBox) -> Vec<usize> {
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(bbox))
            .map(|item| item.position)
            .collect()
    }

    pub(crate) fn nearest(&self, x: f64, y: f64, k: usize) -> Vec<(usize, f64)> {
        let mut found = Vec::with_capacity(k);
        let mut kth: Option<f64> = None;
        for (item, distance_2) in self.tree.nearest_neighbor_iter_with_distance_2(&[x, y]) {
            if let Some(limit) = kth
                && distance_2 > limit
            {
                break;
            }
            found.push((
                item.position,
                item.handle.geometry().distance_to_point(x, y),
            ));
            if found.len() == k {
                kth = Some(distance_2);
            }
        }
        found
    }
}
