//! Per-partition geometry indexes.
//!
//! A [`GeometryIndex`] is built once from a partition's entries and is
//! read-only afterwards. Both variants share one contract:
//!
//! - [`query`](GeometryIndex::query) returns the positions of every entry whose
//!   bounding box overlaps the query box (edges inclusive). This is a
//!   candidate superset; callers apply the exact predicate.
//! - [`nearest`](GeometryIndex::nearest) returns entries ordered by exact
//!   distance to a point, ties by geometry id. Every entry tied with the k-th
//!   distance is included, so merging per-partition answers is exact.
//!
//! Malformed input (NaN or infinite coordinates) fails the single call with
//! [`GeoshardError::IndexQuery`] and leaves the index untouched.

mod quadtree;
mod rtree;

pub use quadtree::QuadTreeIndex;
pub use rtree::RTreeIndex;

use crate::assign::PartitionEntry;
use crate::config::{Config, IndexType};
use crate::error::{GeoshardError, Result};
use crate::geometry::{GeometryHandle, SpatialGeometry};
use geoshard_types::BoundingBox;

/// Structural limits for the quad-tree variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    pub node_capacity: usize,
    pub max_depth: usize,
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            node_capacity: config.index_node_capacity.max(1),
            max_depth: config.index_max_depth.max(1),
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Spatial index over one partition's geometries.
#[derive(Debug)]
pub enum GeometryIndex<G> {
    RTree(RTreeIndex<G>),
    QuadTree(QuadTreeIndex<G>),
}

impl<G: SpatialGeometry> GeometryIndex<G> {
    /// Bulk-build an index over `entries`; positions refer to this slice.
    pub fn build(index_type: IndexType, entries: &[PartitionEntry<G>], options: IndexOptions) -> Self {
        let handles: Vec<GeometryHandle<G>> = entries.iter().map(|e| e.handle.clone()).collect();
        match index_type {
            IndexType::RTree => GeometryIndex::RTree(RTreeIndex::bulk_load(handles)),
            IndexType::QuadTree => GeometryIndex::QuadTree(QuadTreeIndex::build(handles, options)),
        }
    }

    pub fn index_type(&self) -> IndexType {
        match self {
            GeometryIndex::RTree(_) => IndexType::RTree,
            GeometryIndex::QuadTree(_) => IndexType::QuadTree,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GeometryIndex::RTree(index) => index.len(),
            GeometryIndex::QuadTree(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, position: usize) -> Option<&GeometryHandle<G>> {
        match self {
            GeometryIndex::RTree(index) => index.handle(position),
            GeometryIndex::QuadTree(index) => index.handle(position),
        }
    }

    /// Positions of entries whose bounding box overlaps `bbox`, ascending.
    pub fn query(&self, bbox: &BoundingBox) -> Result<Vec<usize>> {
        if !bbox.is_finite() {
            log::warn!("Rejecting index query with non-finite bounding box {bbox:?}");
            return Err(GeoshardError::index_query(format!(
                "query box has non-finite coordinates: {bbox:?}"
            )));
        }
        let mut positions = match self {
            GeometryIndex::RTree(index) => index.query(bbox),
            GeometryIndex::QuadTree(index) => index.query(bbox),
        };
        positions.sort_unstable();
        Ok(positions)
    }

    /// The `k` nearest entries to `(x, y)` plus any ties at the k-th distance.
    pub fn nearest(&self, x: f64, y: f64, k: usize) -> Result<Vec<(usize, f64)>> {
        if !x.is_finite() || !y.is_finite() {
            log::warn!("Rejecting nearest query with non-finite point ({x}, {y})");
            return Err(GeoshardError::index_query(format!(
                "query point has non-finite coordinates: ({x}, {y})"
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut found = match self {
            GeometryIndex::RTree(index) => index.nearest(x, y, k),
            GeometryIndex::QuadTree(index) => index.nearest(x, y, k),
        };
        found.sort_by(|a, b| {
            a.1.total_cmp(&b.1).then_with(|| {
                let id_a = self.handle(a.0).map(|h| h.id());
                let id_b = self.handle(b.0).map(|h| h.id());
                id_a.cmp(&id_b)
            })
        });
        Ok(found)
    }
}
