//! Spatial joins between two partitioned datasets.
//!
//! # Strategies
//!
//! **Co-partitioned**: both datasets share one boundary set. Partition `P` of
//! the left side is joined only with partition `P` of the right side: every
//! left entry probes the right index with its bounding box (grown by the join
//! distance), and each candidate is checked with the exact predicate.
//!
//! **Broadcast**: the home replicas of the smaller dataset are sent to every
//! partition of the larger one. Matches are taken only against the larger
//! side's home replicas, so each pair is produced once and the boundary sets
//! do not need to match.
//!
//! # Deduplication
//!
//! In a co-partitioned join a pair can be found in every partition holding a
//! replica of both geometries. It is reported only from the home partition of
//! the *reference box*, the intersection of the two assignment boxes. That
//! partition overlaps the reference box, so it holds a replica of both
//! geometries and the pair is reported exactly once. For points this is the
//! home partition of one of the two geometries.
//!
//! For distance joins the right dataset must have been assigned on boxes
//! grown by at least the join distance, otherwise neighbours across a
//! partition edge could never meet.

use crate::assign::PartitionEntry;
use crate::config::{Config, JoinStrategy, SpatialPredicate};
use crate::dataset::{Partition, PartitionedDataset};
use crate::error::{GeoshardError, Result};
use crate::geometry::{GeometryHandle, GeometryId, SpatialGeometry};
use crate::partitioning::PartitionId;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// One matching pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JoinPair {
    pub left_id: GeometryId,
    pub right_id: GeometryId,
    /// Measured distance, present for within-distance joins.
    pub distance: Option<f64>,
}

/// Counters collected while joining.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinStats {
    /// Partitions that did local work.
    pub partitions_joined: usize,
    /// Candidate pairs returned by index probes.
    pub candidates: usize,
    /// Candidates that satisfied the exact predicate.
    pub matches: usize,
    /// Matches discarded because another partition reports them.
    pub duplicates_rejected: usize,
    pub pairs: usize,
}

impl JoinStats {
    fn merge(mut self, other: JoinStats) -> JoinStats {
        self.partitions_joined += other.partitions_joined;
        self.candidates += other.candidates;
        self.matches += other.matches;
        self.duplicates_rejected += other.duplicates_rejected;
        self
    }
}

/// Join result: pairs sorted by `(left_id, right_id)` plus statistics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinOutput {
    pub pairs: Vec<JoinPair>,
    pub stats: JoinStats,
}

impl JoinOutput {
    fn from_parts(parts: Vec<(Vec<JoinPair>, JoinStats)>) -> Self {
        let mut stats = JoinStats::default();
        let mut pairs = Vec::new();
        for (local, local_stats) in parts {
            pairs.extend(local);
            stats = stats.merge(local_stats);
        }
        pairs.sort_by(|a, b| (a.left_id, a.right_id).cmp(&(b.left_id, b.right_id)));
        stats.pairs = pairs.len();
        JoinOutput { pairs, stats }
    }

    /// Just the `(left_id, right_id)` pairs.
    pub fn id_pairs(&self) -> Vec<(GeometryId, GeometryId)> {
        self.pairs.iter().map(|p| (p.left_id, p.right_id)).collect()
    }
}

/// Executes spatial joins with a fixed strategy and predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinEngine {
    strategy: JoinStrategy,
    predicate: SpatialPredicate,
}

impl JoinEngine {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            strategy: config.join_strategy,
            predicate: config.predicate,
        })
    }

    pub fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    pub fn predicate(&self) -> SpatialPredicate {
        self.predicate
    }

    /// Join with the configured strategy.
    pub fn join<G: SpatialGeometry>(
        &self,
        left: &PartitionedDataset<G>,
        right: &PartitionedDataset<G>,
    ) -> Result<JoinOutput> {
        let output = match self.strategy {
            JoinStrategy::CoPartitioned => self.co_partitioned_join(left, right)?,
            JoinStrategy::Broadcast => self.broadcast_join(left, right)?,
        };
        log::debug!(
            "{:?} join with {:?}: {:?}",
            self.strategy,
            self.predicate,
            output.stats
        );
        Ok(output)
    }

    /// Partition-by-partition join over a shared boundary set.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the boundary sets differ, or when the join
    /// distance exceeds the expansion the right dataset was assigned with.
    pub fn co_partitioned_join<G: SpatialGeometry>(
        &self,
        left: &PartitionedDataset<G>,
        right: &PartitionedDataset<G>,
    ) -> Result<JoinOutput> {
        if !left.shares_boundaries_with(right) {
            return Err(GeoshardError::invalid_config(
                "co-partitioned join requires both datasets to share one boundary set",
            ));
        }
        let distance = self.predicate.distance();
        if distance > right.expansion() {
            return Err(GeoshardError::invalid_config(format!(
                "join distance {distance} exceeds the right dataset expansion {}",
                right.expansion()
            )));
        }

        let parts: Vec<(Vec<JoinPair>, JoinStats)> = left
            .partitions()
            .par_iter()
            .zip(right.partitions().par_iter())
            .filter(|(l, r)| !l.is_empty() && !r.is_empty())
            .map(|(l, r)| self.join_partition(left, l.id(), l.entries(), r))
            .collect::<Result<_>>()?;

        Ok(JoinOutput::from_parts(parts))
    }

    fn join_partition<G: SpatialGeometry>(
        &self,
        left: &PartitionedDataset<G>,
        partition_id: PartitionId,
        left_entries: &[PartitionEntry<G>],
        right: &Partition<G>,
    ) -> Result<(Vec<JoinPair>, JoinStats)> {
        let index = right.index();
        let right_entries = right.entries();
        let distance = self.predicate.distance();
        let mut stats = JoinStats {
            partitions_joined: 1,
            ..JoinStats::default()
        };
        let mut pairs = Vec::new();

        for l in left_entries {
            let probe = l.handle.bbox().expand(distance);
            for position in index.query(&probe)? {
                stats.candidates += 1;
                let r = &right_entries[position];
                let Some(measured) = self
                    .predicate
                    .evaluate_with_distance(l.handle.geometry(), r.handle.geometry())
                else {
                    continue;
                };
                stats.matches += 1;

                let reported_here = l
                    .assigned_box
                    .intersection(&r.assigned_box)
                    .and_then(|reference| left.lookup().home_of_box(&reference))
                    == Some(partition_id);
                if !reported_here {
                    stats.duplicates_rejected += 1;
                    continue;
                }
                pairs.push(JoinPair {
                    left_id: l.handle.id(),
                    right_id: r.handle.id(),
                    distance: measured,
                });
            }
        }
        log::trace!(
            "partition {partition_id}: {} candidates, {} pairs",
            stats.candidates,
            pairs.len()
        );
        Ok((pairs, stats))
    }

    /// Broadcast the smaller side's home replicas to every partition of the other.
    pub fn broadcast_join<G: SpatialGeometry>(
        &self,
        left: &PartitionedDataset<G>,
        right: &PartitionedDataset<G>,
    ) -> Result<JoinOutput> {
        let broadcast_left = left.len() <= right.len();
        let (small, large) = if broadcast_left {
            (left, right)
        } else {
            (right, left)
        };
        // Evaluated as predicate(broadcast, partitioned).
        let predicate = if broadcast_left {
            self.predicate
        } else {
            self.predicate.flipped()
        };
        let distance = predicate.distance();
        let broadcast: Vec<&GeometryHandle<G>> = small.home_handles().collect();
        log::debug!(
            "broadcasting {} geometries to {} partitions",
            broadcast.len(),
            large.num_partitions()
        );

        let parts: Vec<(Vec<JoinPair>, JoinStats)> = large
            .partitions()
            .par_iter()
            .filter(|p| p.home_count() > 0)
            .map(|partition| -> Result<(Vec<JoinPair>, JoinStats)> {
                let index = partition.index();
                let entries = partition.entries();
                let mut stats = JoinStats {
                    partitions_joined: 1,
                    ..JoinStats::default()
                };
                let mut pairs = Vec::new();

                for b in &broadcast {
                    let probe = b.bbox().expand(distance);
                    for position in index.query(&probe)? {
                        let e = &entries[position];
                        if !e.is_home {
                            continue;
                        }
                        stats.candidates += 1;
                        let Some(measured) =
                            predicate.evaluate_with_distance(b.geometry(), e.handle.geometry())
                        else {
                            continue;
                        };
                        stats.matches += 1;
                        let (left_id, right_id) = if broadcast_left {
                            (b.id(), e.handle.id())
                        } else {
                            (e.handle.id(), b.id())
                        };
                        pairs.push(JoinPair {
                            left_id,
                            right_id,
                            distance: measured,
                        });
                    }
                }
                Ok((pairs, stats))
            })
            .collect::<Result<_>>()?;

        Ok(JoinOutput::from_parts(parts))
    }

    /// Number of matches per left geometry id, ascending by id.
    ///
    /// Left geometries without a match are omitted.
    pub fn join_count_by_left<G: SpatialGeometry>(
        &self,
        left: &PartitionedDataset<G>,
        right: &PartitionedDataset<G>,
    ) -> Result<Vec<(GeometryId, usize)>> {
        let output = self.join(left, right)?;
        let mut counts: FxHashMap<GeometryId, usize> = FxHashMap::default();
        for pair in &output.pairs {
            *counts.entry(pair.left_id).or_insert(0) += 1;
        }
        let mut counts: Vec<(GeometryId, usize)> = counts.into_iter().collect();
        counts.sort_unstable_by_key(|(id, _)| *id);
        Ok(counts)
    }
}
