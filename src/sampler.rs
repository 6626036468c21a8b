//! Single-pass bounding-box sampling.
//!
//! Partition boundaries are derived from a bounded sample of the source's
//! bounding boxes rather than from the whole dataset. [`BoundingBoxSampler`]
//! keeps a uniform reservoir (without replacement) of at most `sample_size`
//! boxes while streaming the source exactly once, and records the population
//! count and full population extent on the way.
//!
//! Large sources can be sampled shard by shard with [`sample_sharded`]: each
//! shard fills its own reservoir concurrently. Finished reservoirs are
//! collected under a lock and merged once every shard is done.

use crate::error::{GeoshardError, Result};
use fastrand::Rng;
use geoshard_types::BoundingBox;
use parking_lot::Mutex;
use rayon::prelude::*;

/// Reservoir sampler over bounding boxes.
#[derive(Debug)]
pub struct BoundingBoxSampler {
    sample_size: usize,
    samples: Vec<BoundingBox>,
    population_count: usize,
    extent: Option<BoundingBox>,
    rng: Rng,
}

/// Samples collected by a [`BoundingBoxSampler`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundingBoxSamples {
    samples: Vec<BoundingBox>,
    population_count: usize,
    extent: Option<BoundingBox>,
}

impl BoundingBoxSampler {
    /// Create a sampler keeping at most `sample_size` boxes.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when `sample_size` is zero.
    pub fn try_new(sample_size: usize, seed: u64) -> Result<Self> {
        if sample_size == 0 {
            return Err(GeoshardError::invalid_config(
                "sample_size must be greater than zero",
            ));
        }
        Ok(Self {
            sample_size,
            samples: Vec::with_capacity(sample_size.min(1 << 16)),
            population_count: 0,
            extent: None,
            rng: Rng::with_seed(seed),
        })
    }

    /// Observe one bounding box.
    pub fn add_bbox(&mut self, bbox: &BoundingBox) {
        self.population_count += 1;
        self.extent = Some(match self.extent {
            Some(extent) => extent.union(bbox),
            None => *bbox,
        });

        if self.samples.len() < self.sample_size {
            self.samples.push(*bbox);
        } else {
            let index = self.rng.usize(..self.population_count);
            if index < self.sample_size {
                self.samples[index] = *bbox;
            }
        }
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn population_count(&self) -> usize {
        self.population_count
    }

    /// Consume the sampler and return the collected samples
    pub fn into_samples(self) -> BoundingBoxSamples {
        BoundingBoxSamples {
            samples: self.samples,
            population_count: self.population_count,
            extent: self.extent,
        }
    }
}

impl BoundingBoxSamples {
    /// Build a sample set directly from boxes (every box is a sample).
    pub fn from_boxes(samples: Vec<BoundingBox>) -> Self {
        let extent = samples.iter().copied().reduce(|acc, b| acc.union(&b));
        Self {
            population_count: samples.len(),
            samples,
            extent,
        }
    }

    pub fn samples(&self) -> &[BoundingBox] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of boxes observed while sampling.
    pub fn population_count(&self) -> usize {
        self.population_count
    }

    /// Union of every observed box, not only of the retained samples.
    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }

    /// Merge two reservoirs into one uniform reservoir of at most `sample_size`.
    ///
    /// Each output slot is drawn from `self` or `other` with probability
    /// proportional to the population each still represents, then a random
    /// remaining sample of that side is taken (hypergeometric merge).
    pub fn merge(self, other: BoundingBoxSamples, sample_size: usize, rng: &mut Rng) -> Self {
        let extent = match (self.extent, other.extent) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        let population_count = self.population_count + other.population_count;

        let mut left = self.samples;
        let mut right = other.samples;
        let mut left_pop = self.population_count;
        let mut right_pop = other.population_count;
        let target = sample_size.min(population_count);
        let mut merged = Vec::with_capacity(target);

        while merged.len() < target {
            let take_left = if right.is_empty() || right_pop == 0 {
                true
            } else if left.is_empty() || left_pop == 0 {
                false
            } else {
                rng.usize(..left_pop + right_pop) < left_pop
            };
            let (pool, pop) = if take_left {
                (&mut left, &mut left_pop)
            } else {
                (&mut right, &mut right_pop)
            };
            if pool.is_empty() {
                break;
            }
            let index = rng.usize(..pool.len());
            merged.push(pool.swap_remove(index));
            *pop = pop.saturating_sub(1);
        }

        Self {
            samples: merged,
            population_count,
            extent,
        }
    }
}

/// Sample a stream of bounding boxes in a single pass.
///
/// # Errors
///
/// `InsufficientData` if the stream is empty, `InvalidConfiguration` if
/// `sample_size` is zero.
pub fn sample<'a, I>(boxes: I, sample_size: usize, seed: u64) -> Result<BoundingBoxSamples>
where
    I: IntoIterator<Item = &'a BoundingBox>,
{
    let mut sampler = BoundingBoxSampler::try_new(sample_size, seed)?;
    for bbox in boxes {
        sampler.add_bbox(bbox);
    }
    if sampler.population_count() == 0 {
        return Err(GeoshardError::InsufficientData);
    }
    log::debug!(
        "sampled {} of {} bounding boxes",
        sampler.num_samples(),
        sampler.population_count()
    );
    Ok(sampler.into_samples())
}

/// Sample disjoint shards concurrently and merge the reservoirs.
///
/// Shard `i` is sampled with seed `seed + i`. Finished shard reservoirs are
/// collected under a lock and merged in shard order with a generator seeded
/// with `seed`, so a fixed seed and shard layout give a reproducible sample
/// whatever order the shards complete in.
pub fn sample_sharded(
    shards: &[&[BoundingBox]],
    sample_size: usize,
    seed: u64,
) -> Result<BoundingBoxSamples> {
    if sample_size == 0 {
        return Err(GeoshardError::invalid_config(
            "sample_size must be greater than zero",
        ));
    }

    let finished: Mutex<Vec<(usize, BoundingBoxSamples)>> =
        Mutex::new(Vec::with_capacity(shards.len()));

    shards
        .par_iter()
        .enumerate()
        .try_for_each(|(shard_idx, shard)| -> Result<()> {
            let mut sampler =
                BoundingBoxSampler::try_new(sample_size, seed.wrapping_add(shard_idx as u64))?;
            for bbox in shard.iter() {
                sampler.add_bbox(bbox);
            }
            finished.lock().push((shard_idx, sampler.into_samples()));
            Ok(())
        })?;

    let mut finished = finished.into_inner();
    finished.sort_unstable_by_key(|(shard_idx, _)| *shard_idx);

    let mut rng = Rng::with_seed(seed);
    let merged = finished
        .into_iter()
        .map(|(_, samples)| samples)
        .reduce(|acc, next| acc.merge(next, sample_size, &mut rng));

    match merged {
        Some(samples) if samples.population_count() > 0 => {
            log::debug!(
                "sampled {} of {} bounding boxes across {} shards",
                samples.len(),
                samples.population_count(),
                shards.len()
            );
            Ok(samples)
        }
        _ => Err(GeoshardError::InsufficientData),
    }
}
