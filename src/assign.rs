//! Assignment of geometries to partitions.
//!
//! Each geometry is placed, on its *assignment box* (its bounding box grown by
//! the dataset's expansion distance), into every partition whose boundary the
//! box overlaps. Exactly one of those replicas is the geometry's home.
//!
//! ## Home rule
//!
//! The home of a box is the lowest-id boundary containing the box's minimum
//! corner. If no boundary contains that corner, which can only happen for an
//! expanded box reaching past the outer extent, the home is the lowest-id
//! boundary the box overlaps. The rule depends on nothing but the box and the
//! boundary set, so it is deterministic and the same answer is produced
//! wherever it is evaluated. The join and range engines apply the same rule to
//! intersection boxes to deduplicate results.

use crate::geometry::GeometryHandle;
use crate::partitioning::{PartitionBoundary, PartitionId};
use geoshard_types::BoundingBox;
use rayon::prelude::*;
use rstar::{AABB, RTree, RTreeObject};
use smallvec::SmallVec;
use std::fmt;

/// Partition ids a single box maps to; most boxes touch few partitions.
pub type PartitionIds = SmallVec<[PartitionId; 4]>;

#[derive(Debug, Clone, Copy)]
struct IndexedBoundary {
    id: PartitionId,
    bbox: BoundingBox,
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bbox)
    }
}

#[inline]
pub(crate) fn envelope_of(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y])
}

/// R-tree over partition boundaries answering "which partitions does this box touch".
pub struct BoundaryLookup {
    tree: RTree<IndexedBoundary>,
    boxes: Vec<BoundingBox>,
}

impl fmt::Debug for BoundaryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryLookup")
            .field("boxes", &self.boxes)
            .finish_non_exhaustive()
    }
}

impl BoundaryLookup {
    /// Index `boundaries`; ids are expected to be dense and in order.
    pub fn new(boundaries: &[PartitionBoundary]) -> Self {
        let items: Vec<IndexedBoundary> = boundaries
            .iter()
            .map(|b| IndexedBoundary {
                id: b.id,
                bbox: b.bbox,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            boxes: boundaries.iter().map(|b| b.bbox).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boundary(&self, id: PartitionId) -> Option<&BoundingBox> {
        self.boxes.get(id as usize)
    }

    /// Ids of every boundary overlapping `bbox` (edges inclusive), ascending.
    pub fn overlapping(&self, bbox: &BoundingBox) -> PartitionIds {
        let mut ids: PartitionIds = self
            .tree
            .locate_in_envelope_intersecting(&envelope_of(bbox))
            .map(|b| b.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Home partition of `bbox` among `candidates` (its overlapping ids, ascending).
    fn home_among(&self, bbox: &BoundingBox, candidates: &[PartitionId]) -> Option<PartitionId> {
        let (x, y) = bbox.min_corner();
        candidates
            .iter()
            .copied()
            .find(|id| {
                self.boxes
                    .get(*id as usize)
                    .is_some_and(|b| b.contains_point(x, y))
            })
            .or_else(|| candidates.first().copied())
    }

    /// Home partition of `bbox`, or `None` if it overlaps no boundary.
    pub fn home_of_box(&self, bbox: &BoundingBox) -> Option<PartitionId> {
        let candidates = self.overlapping(bbox);
        self.home_among(bbox, &candidates)
    }
}

/// One replica of a geometry inside a partition.
#[derive(Debug)]
pub struct PartitionEntry<G> {
    pub handle: GeometryHandle<G>,
    /// Box the geometry was assigned on (bbox grown by the dataset expansion).
    pub assigned_box: BoundingBox,
    /// True for exactly one replica of each assigned geometry.
    pub is_home: bool,
}

impl<G> Clone for PartitionEntry<G> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            assigned_box: self.assigned_box,
            is_home: self.is_home,
        }
    }
}

/// Geometries that fell outside every boundary during one assignment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBuildWarning {
    pub dropped: usize,
}

impl fmt::Display for PartitionBuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} geometries lie outside every partition boundary and were dropped",
            self.dropped
        )
    }
}

/// Outcome of one assignment call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssignmentReport {
    /// Geometries placed in at least one partition.
    pub geometries: usize,
    /// Replicas created, home entries included.
    pub entries: usize,
    pub warning: Option<PartitionBuildWarning>,
}

impl AssignmentReport {
    pub fn dropped(&self) -> usize {
        self.warning.map_or(0, |w| w.dropped)
    }

    /// Average number of partitions each assigned geometry landed in.
    pub fn replication_factor(&self) -> f64 {
        if self.geometries == 0 {
            0.0
        } else {
            self.entries as f64 / self.geometries as f64
        }
    }
}

/// Places geometry handles into partitions.
pub struct PartitionAssigner<'a> {
    lookup: &'a BoundaryLookup,
    expansion: f64,
}

impl<'a> PartitionAssigner<'a> {
    pub fn new(lookup: &'a BoundaryLookup, expansion: f64) -> Self {
        Self { lookup, expansion }
    }

    /// Partitions and home for one box, or `None` if it overlaps no boundary.
    pub fn place(&self, bbox: &BoundingBox) -> Option<(BoundingBox, PartitionIds, PartitionId)> {
        let assigned = if self.expansion > 0.0 {
            bbox.expand(self.expansion)
        } else {
            *bbox
        };
        let ids = self.lookup.overlapping(&assigned);
        let home = self.lookup.home_among(&assigned, &ids)?;
        Some((assigned, ids, home))
    }

    /// Assign every handle, returning entries bucketed by partition id.
    ///
    /// Entries keep source order within each partition. Dropped geometries are
    /// counted into a single warning, logged once.
    pub fn assign<G: Send + Sync>(
        &self,
        handles: &[GeometryHandle<G>],
    ) -> (Vec<Vec<PartitionEntry<G>>>, AssignmentReport) {
        let placements: Vec<_> = handles.par_iter().map(|h| self.place(h.bbox())).collect();

        let mut buckets: Vec<Vec<PartitionEntry<G>>> =
            (0..self.lookup.len()).map(|_| Vec::new()).collect();
        let mut report = AssignmentReport::default();
        let mut dropped = 0usize;

        for (handle, placement) in handles.iter().zip(placements) {
            let Some((assigned_box, ids, home)) = placement else {
                dropped += 1;
                continue;
            };
            report.geometries += 1;
            report.entries += ids.len();
            for id in ids {
                buckets[id as usize].push(PartitionEntry {
                    handle: handle.clone(),
                    assigned_box,
                    is_home: id == home,
                });
            }
        }

        if dropped > 0 {
            let warning = PartitionBuildWarning { dropped };
            log::warn!("{warning}");
            report.warning = Some(warning);
        }
        log::debug!(
            "assigned {} geometries as {} entries across {} partitions",
            report.geometries,
            report.entries,
            buckets.len()
        );
        (buckets, report)
    }
}
