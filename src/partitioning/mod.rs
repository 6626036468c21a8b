//! Partition boundary construction.
//!
//! A boundary builder turns a [`BoundingBoxSamples`] and a target partition
//! count into an ordered list of [`PartitionBoundary`] values. The scheme is a
//! plain enum on [`Config`], dispatched here:
//!
//! | scheme | boundaries | overlap |
//! |---|---|---|
//! | [`Grid`](PartitioningScheme::Grid) | exactly `n` equal cells | edges only |
//! | [`QuadTree`](PartitioningScheme::QuadTree) | about `n` leaves, split where samples crowd | edges only |
//! | [`KdbTree`](PartitioningScheme::KdbTree) | `n` leaves of near-equal sample share | edges only |
//! | [`Hilbert`](PartitioningScheme::Hilbert) | `n` equal-count curve ranges | may overlap |
//!
//! Boundaries are built over the extent of the whole sampled population, so
//! every source box lies inside their union. Boundary ids are dense, `0..len`,
//! in output order.
//!
//! # Degenerate samples
//!
//! A population with zero width or height is first inflated to a small
//! non-degenerate box around the data. When the data is degenerate (flat, or
//! every sample identical) and the scheme still cannot produce exactly `n`
//! cells, the builder falls back to an equal grid of `n` cells.

mod grid;
mod hilbert;
mod kdb;
mod quadtree;
mod util;

use crate::config::{Config, PartitioningScheme};
use crate::error::{GeoshardError, Result};
use crate::sampler::BoundingBoxSamples;
use geoshard_types::BoundingBox;
use serde::{Deserialize, Serialize};

/// Identifier of a partition, dense within one boundary set.
pub type PartitionId = u32;

/// A partition's extent plus its id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionBoundary {
    pub id: PartitionId,
    pub bbox: BoundingBox,
}

/// Build partition boundaries from `samples` according to `config`.
///
/// # Errors
///
/// `InsufficientData` when nothing was sampled, `InvalidConfiguration` when
/// `config` fails validation.
pub fn build_boundaries(
    samples: &BoundingBoxSamples,
    config: &Config,
) -> Result<Vec<PartitionBoundary>> {
    config.validate()?;
    let extent = samples.extent().ok_or(GeoshardError::InsufficientData)?;
    if samples.is_empty() {
        return Err(GeoshardError::InsufficientData);
    }
    if !extent.is_finite() {
        return Err(GeoshardError::invalid_config(
            "sampled extent is not finite",
        ));
    }

    let n = config.num_partitions;
    let flat = extent.is_degenerate();
    let extent = if flat {
        util::inflate_degenerate(&extent)
    } else {
        extent
    };

    let corners: Vec<(f64, f64)> = samples.samples().iter().map(|b| b.min_corner()).collect();
    let distinct = util::distinct_positions(&corners);

    let mut cells = match config.partitioning_scheme {
        PartitioningScheme::Grid => grid::build(&extent, n),
        PartitioningScheme::QuadTree => {
            quadtree::build(&extent, corners, n, config.quad_tree_max_depth)
        }
        PartitioningScheme::KdbTree => {
            kdb::build(&extent, corners, n, config.kdb_min_leaf_samples)
        }
        PartitioningScheme::Hilbert => {
            let centres: Vec<(f64, f64)> = samples.samples().iter().map(|b| b.center()).collect();
            hilbert::build(&extent, &centres, n, config.hilbert_order)
        }
    };

    if (flat || distinct < n) && cells.len() != n {
        log::debug!(
            "degenerate sample: {:?} produced {} cells from {distinct} distinct positions, using an equal grid of {n}",
            config.partitioning_scheme,
            cells.len()
        );
        cells = grid::build(&extent, n);
    }

    log::debug!(
        "built {} {:?} boundaries from {} samples (population {})",
        cells.len(),
        config.partitioning_scheme,
        samples.len(),
        samples.population_count()
    );

    Ok(cells
        .into_iter()
        .enumerate()
        .map(|(id, bbox)| PartitionBoundary {
            id: id as PartitionId,
            bbox,
        })
        .collect())
}

/// Check that `boundaries` is usable: non-empty, finite, ids dense in order.
pub(crate) fn validate_boundaries(boundaries: &[PartitionBoundary]) -> Result<()> {
    if boundaries.is_empty() {
        return Err(GeoshardError::invalid_config("boundary set is empty"));
    }
    for (position, boundary) in boundaries.iter().enumerate() {
        if boundary.id as usize != position {
            return Err(GeoshardError::invalid_config(format!(
                "boundary ids must be dense and ordered, found id {} at position {position}",
                boundary.id
            )));
        }
        if !boundary.bbox.is_finite() {
            return Err(GeoshardError::invalid_config(format!(
                "boundary {} is not finite",
                boundary.id
            )));
        }
    }
    Ok(())
}
