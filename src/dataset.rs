//! Partitioned datasets.
//!
//! A [`PartitionedDataset`] owns the boundary set, one [`Partition`] per
//! boundary (indexed by partition id), and the report of the assignment that
//! filled them. Everything is immutable after construction and can be shared
//! across threads without locking. Each partition builds its
//! [`GeometryIndex`] on first use; concurrent first accesses build it once.

use crate::assign::{AssignmentReport, BoundaryLookup, PartitionAssigner, PartitionEntry};
use crate::config::{Config, IndexType};
use crate::error::{GeoshardError, Result};
use crate::geometry::{GeometryHandle, GeometryId, SpatialGeometry};
use crate::index::{GeometryIndex, IndexOptions};
use crate::partitioning::{PartitionBoundary, PartitionId, build_boundaries, validate_boundaries};
use crate::sampler;
use geoshard_types::BoundingBox;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One partition: its boundary, its replicas, and a lazily built index.
#[derive(Debug)]
pub struct Partition<G> {
    id: PartitionId,
    boundary: BoundingBox,
    entries: Vec<PartitionEntry<G>>,
    content_extent: Option<BoundingBox>,
    index_type: IndexType,
    options: IndexOptions,
    index: OnceCell<GeometryIndex<G>>,
}

impl<G: SpatialGeometry> Partition<G> {
    fn new(
        boundary: &PartitionBoundary,
        entries: Vec<PartitionEntry<G>>,
        index_type: IndexType,
        options: IndexOptions,
    ) -> Self {
        let content_extent = entries
            .iter()
            .map(|e| *e.handle.bbox())
            .reduce(|a, b| a.union(&b));
        Self {
            id: boundary.id,
            boundary: boundary.bbox,
            entries,
            content_extent,
            index_type,
            options,
            index: OnceCell::new(),
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn boundary(&self) -> &BoundingBox {
        &self.boundary
    }

    pub fn entries(&self) -> &[PartitionEntry<G>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn home_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_home).count()
    }

    /// Union of the bounding boxes of every entry, `None` when empty.
    pub fn content_extent(&self) -> Option<&BoundingBox> {
        self.content_extent.as_ref()
    }

    /// The partition's index, built on first call.
    pub fn index(&self) -> &GeometryIndex<G> {
        self.index.get_or_init(|| {
            log::trace!(
                "building {:?} index for partition {} ({} entries)",
                self.index_type,
                self.id,
                self.entries.len()
            );
            GeometryIndex::build(self.index_type, &self.entries, self.options)
        })
    }

    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }
}

/// Geometries partitioned by a shared boundary set.
#[derive(Debug)]
pub struct PartitionedDataset<G> {
    boundaries: Arc<[PartitionBoundary]>,
    lookup: Arc<BoundaryLookup>,
    partitions: Vec<Partition<G>>,
    expansion: f64,
    report: AssignmentReport,
}

impl<G: SpatialGeometry> PartitionedDataset<G> {
    /// Sample `source`, derive boundaries, and assign every geometry.
    ///
    /// # Errors
    ///
    /// `InsufficientData` for an empty source; `InvalidConfiguration` for a
    /// config that fails validation or duplicate geometry ids.
    pub fn build(source: &[GeometryHandle<G>], config: &Config) -> Result<Self> {
        Self::build_expanded(source, config, 0.0)
    }

    /// Like [`build`](Self::build), assigning on bounding boxes grown by `expansion`.
    ///
    /// Use this for the right side of a distance join.
    pub fn build_expanded(
        source: &[GeometryHandle<G>],
        config: &Config,
        expansion: f64,
    ) -> Result<Self> {
        config.validate()?;
        validate_expansion(expansion)?;
        if source.is_empty() {
            return Err(GeoshardError::InsufficientData);
        }

        let samples = sampler::sample(
            source.iter().map(|h| h.bbox()),
            config.sample_size,
            config.effective_seed(),
        )?;
        let boundaries: Arc<[PartitionBoundary]> = build_boundaries(&samples, config)?.into();
        Self::assign(source, boundaries, config, expansion)
    }

    /// Assign `source` onto an existing boundary set, for co-partitioning.
    pub fn with_boundaries(
        source: &[GeometryHandle<G>],
        boundaries: Arc<[PartitionBoundary]>,
        config: &Config,
    ) -> Result<Self> {
        Self::with_boundaries_expanded(source, boundaries, config, 0.0)
    }

    pub fn with_boundaries_expanded(
        source: &[GeometryHandle<G>],
        boundaries: Arc<[PartitionBoundary]>,
        config: &Config,
        expansion: f64,
    ) -> Result<Self> {
        config.validate()?;
        validate_expansion(expansion)?;
        validate_boundaries(&boundaries)?;
        Self::assign(source, boundaries, config, expansion)
    }

    fn assign(
        source: &[GeometryHandle<G>],
        boundaries: Arc<[PartitionBoundary]>,
        config: &Config,
        expansion: f64,
    ) -> Result<Self> {
        check_unique_ids(source)?;

        let lookup = Arc::new(BoundaryLookup::new(&boundaries));
        let (buckets, report) = PartitionAssigner::new(&lookup, expansion).assign(source);

        let options = IndexOptions::from_config(config);
        let partitions: Vec<Partition<G>> = boundaries
            .par_iter()
            .zip(buckets)
            .map(|(boundary, entries)| Partition::new(boundary, entries, config.index_type, options))
            .collect();

        Ok(Self {
            boundaries,
            lookup,
            partitions,
            expansion,
            report,
        })
    }

    pub fn boundaries(&self) -> &Arc<[PartitionBoundary]> {
        &self.boundaries
    }

    pub fn lookup(&self) -> &BoundaryLookup {
        &self.lookup
    }

    pub fn partitions(&self) -> &[Partition<G>] {
        &self.partitions
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition<G>> {
        self.partitions.get(id as usize)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Distance the assignment boxes were grown by.
    pub fn expansion(&self) -> f64 {
        self.expansion
    }

    pub fn report(&self) -> &AssignmentReport {
        &self.report
    }

    /// Number of distinct geometries held (dropped ones excluded).
    pub fn len(&self) -> usize {
        self.report.geometries
    }

    pub fn is_empty(&self) -> bool {
        self.report.geometries == 0
    }

    /// True when both datasets use the same boundary set.
    pub fn shares_boundaries_with<H>(&self, other: &PartitionedDataset<H>) -> bool {
        Arc::ptr_eq(&self.boundaries, &other.boundaries) || self.boundaries == other.boundaries
    }

    /// Each geometry's home replica handle, in partition order.
    pub fn home_handles(&self) -> impl Iterator<Item = &GeometryHandle<G>> + '_ {
        self.partitions
            .iter()
            .flat_map(|p| p.entries.iter().filter(|e| e.is_home).map(|e| &e.handle))
    }

    /// Build every partition's index now, in parallel.
    pub fn build_indexes(&self) {
        self.partitions.par_iter().for_each(|p| {
            p.index();
        });
    }

    pub fn stats(&self) -> PartitionStats {
        let counts: Vec<PartitionCount> = self
            .partitions
            .iter()
            .map(|p| PartitionCount {
                id: p.id,
                entries: p.len(),
                homes: p.home_count(),
            })
            .collect();
        let partitions = counts.len();
        let entries: usize = counts.iter().map(|c| c.entries).sum();
        let max_entries = counts.iter().map(|c| c.entries).max().unwrap_or(0);
        let min_entries = counts.iter().map(|c| c.entries).min().unwrap_or(0);
        let mean_entries = if partitions == 0 {
            0.0
        } else {
            entries as f64 / partitions as f64
        };

        PartitionStats {
            partitions,
            geometries: self.report.geometries,
            entries,
            dropped: self.report.dropped(),
            empty_partitions: counts.iter().filter(|c| c.entries == 0).count(),
            min_entries,
            max_entries,
            mean_entries,
            replication_factor: self.report.replication_factor(),
            skew: if mean_entries > 0.0 {
                max_entries as f64 / mean_entries
            } else {
                0.0
            },
            per_partition: counts,
        }
    }
}

fn validate_expansion(expansion: f64) -> Result<()> {
    if !expansion.is_finite() || expansion < 0.0 {
        return Err(GeoshardError::invalid_config(format!(
            "expansion must be finite and non-negative, got {expansion}"
        )));
    }
    Ok(())
}

fn check_unique_ids<G>(source: &[GeometryHandle<G>]) -> Result<()> {
    let mut seen: FxHashSet<GeometryId> = FxHashSet::default();
    seen.reserve(source.len());
    for handle in source {
        if !seen.insert(handle.id()) {
            return Err(GeoshardError::invalid_config(format!(
                "duplicate geometry id {}",
                handle.id()
            )));
        }
    }
    Ok(())
}

/// Entry and home counts of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCount {
    pub id: PartitionId,
    pub entries: usize,
    pub homes: usize,
}

/// Load-balance summary of a partitioned dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub partitions: usize,
    pub geometries: usize,
    /// Replicas across all partitions.
    pub entries: usize,
    pub dropped: usize,
    pub empty_partitions: usize,
    pub min_entries: usize,
    pub max_entries: usize,
    pub mean_entries: f64,
    pub replication_factor: f64,
    /// Largest partition relative to the mean; 1.0 is perfectly balanced.
    pub skew: f64,
    pub per_partition: Vec<PartitionCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitioningScheme;
    use geo::Geometry;

    fn points(n: u64) -> Vec<GeometryHandle<Geometry<f64>>> {
        let mut rng = fastrand::Rng::with_seed(n);
        (0..n)
            .map(|id| GeometryHandle::point(id, rng.f64() * 100.0, rng.f64() * 100.0).unwrap())
            .collect()
    }

    #[test]
    fn test_build_assigns_every_geometry_once_as_home() {
        let source = points(3000);
        let config = Config::default().with_num_partitions(12).with_seed(5);
        let dataset = PartitionedDataset::build(&source, &config).unwrap();

        assert_eq!(dataset.num_partitions(), 12);
        assert_eq!(dataset.len(), 3000);
        assert_eq!(dataset.report().dropped(), 0);

        let mut homes: Vec<GeometryId> = dataset.home_handles().map(|h| h.id()).collect();
        homes.sort_unstable();
        assert_eq!(homes, (0..3000).collect::<Vec<_>>());
    }

    #[test]
    fn test_index_is_lazy_and_cached() {
        let source = points(500);
        let dataset =
            PartitionedDataset::build(&source, &Config::default().with_num_partitions(4).with_seed(1))
                .unwrap();
        let partition = &dataset.partitions()[0];
        assert!(!partition.is_indexed());
        let first = partition.index() as *const _;
        assert!(partition.is_indexed());
        assert_eq!(first, partition.index() as *const _);

        dataset.build_indexes();
        assert!(dataset.partitions().iter().all(|p| p.is_indexed()));
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let source = points(2000);
        let dataset =
            PartitionedDataset::build(&source, &Config::default().with_num_partitions(2).with_seed(2))
                .unwrap();
        let partition = &dataset.partitions()[1];
        let addresses: Vec<usize> = (0..8)
            .into_par_iter()
            .map(|_| partition.index() as *const GeometryIndex<_> as usize)
            .collect();
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_stats() {
        let source = points(4000);
        let config = Config::default()
            .with_partitioning_scheme(PartitioningScheme::KdbTree)
            .with_num_partitions(8)
            .with_seed(3);
        let stats = PartitionedDataset::build(&source, &config).unwrap().stats();
        assert_eq!(stats.partitions, 8);
        assert_eq!(stats.geometries, 4000);
        assert!(stats.entries >= 4000);
        assert!(stats.replication_factor >= 1.0);
        assert!(stats.skew < 1.5, "kdb should balance uniform data: {stats:?}");
        assert_eq!(
            stats.per_partition.iter().map(|c| c.homes).sum::<usize>(),
            4000
        );
    }

    #[test]
    fn test_with_boundaries_and_errors() {
        let source = points(100);
        let config = Config::default().with_num_partitions(4).with_seed(9);
        let left = PartitionedDataset::build(&source, &config).unwrap();
        let right =
            PartitionedDataset::with_boundaries(&points(50), left.boundaries().clone(), &config)
                .unwrap();
        assert!(left.shares_boundaries_with(&right));

        let empty: Vec<GeometryHandle<Geometry<f64>>> = Vec::new();
        assert!(matches!(
            PartitionedDataset::build(&empty, &config),
            Err(GeoshardError::InsufficientData)
        ));
        assert!(
            PartitionedDataset::with_boundaries(&empty, left.boundaries().clone(), &config)
                .unwrap()
                .is_empty()
        );

        let duplicate = vec![source[0].clone(), source[0].clone()];
        assert!(matches!(
            PartitionedDataset::build(&duplicate, &config),
            Err(GeoshardError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            PartitionedDataset::build_expanded(&source, &config, -1.0),
            Err(GeoshardError::InvalidConfiguration(_))
        ));
    }
}
