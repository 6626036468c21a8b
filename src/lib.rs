//! Spatial partitioning, per-partition indexing and deduplicating spatial joins.
//!
//! ```rust
//! use geoshard::prelude::*;
//!
//! let parcels: Vec<GeometryHandle<Geometry>> = (0..400)
//!     .map(|i| {
//!         let (x, y) = ((i % 20) as f64 * 5.0, (i / 20) as f64 * 5.0);
//!         GeometryHandle::rect(i, BoundingBox::new(x, y, x + 6.0, y + 6.0))
//!     })
//!     .collect::<Result<_>>()?;
//! let wells: Vec<GeometryHandle<Geometry>> = (0..50)
//!     .map(|i| GeometryHandle::point(10_000 + i, i as f64 * 2.0, 50.0))
//!     .collect::<Result<_>>()?;
//!
//! let config = Config::default()
//!     .with_partitioning_scheme(PartitioningScheme::KdbTree)
//!     .with_num_partitions(8)
//!     .with_seed(42);
//! let parcels = PartitionedDataset::build(&parcels, &config)?;
//! let wells = PartitionedDataset::with_boundaries(&wells, parcels.boundaries().clone(), &config)?;
//!
//! let joined = JoinEngine::new(&config)?.join(&parcels, &wells)?;
//! assert!(!joined.pairs.is_empty());
//!
//! let nearest = QueryEngine::new(&wells).knn(0.0, 50.0, 3)?;
//! assert_eq!(nearest[0].handle.id(), 10_000);
//! # Ok::<(), geoshard::GeoshardError>(())
//! ```

pub mod assign;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod index;
pub mod join;
pub mod partitioning;
pub mod query;
pub mod sampler;

pub use assign::{AssignmentReport, BoundaryLookup, PartitionBuildWarning, PartitionEntry};
pub use config::{Config, IndexType, JoinStrategy, PartitioningScheme, SpatialPredicate};
pub use dataset::{Partition, PartitionCount, PartitionStats, PartitionedDataset};
pub use error::{GeoshardError, Result};
pub use geometry::{GeometryHandle, GeometryId, SpatialGeometry};
pub use index::{GeometryIndex, IndexOptions};
pub use join::{JoinEngine, JoinOutput, JoinPair, JoinStats};
pub use partitioning::{PartitionBoundary, PartitionId, build_boundaries};
pub use query::{KnnResult, QueryEngine};
pub use sampler::{BoundingBoxSampler, BoundingBoxSamples, sample, sample_sharded};

pub use geo::{Geometry, Point, Polygon, Rect};
pub use geoshard_types::BoundingBox;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoshardError, Result};

    pub use geo::{Geometry, Point, Polygon, Rect};

    pub use geoshard_types::BoundingBox;

    pub use crate::{Config, IndexType, JoinStrategy, PartitioningScheme, SpatialPredicate};

    pub use crate::{GeometryHandle, GeometryId, SpatialGeometry};

    pub use crate::{JoinEngine, JoinOutput, JoinPair, PartitionedDataset, QueryEngine};
}
