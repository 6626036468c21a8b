//! Partitioning, indexing and join configuration.
//!
//! [`Config`] is the single structured options object accepted by every
//! entry point. It is serializable so it can be loaded from JSON (or TOML
//! with the `toml` feature) and is validated before any partition work starts.
use crate::error::{GeoshardError, Result};
use serde::{Deserialize, Serialize};

/// Strategy used to derive partition boundaries from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitioningScheme {
    /// Fixed `rows x cols` grid of equal cells; ignores skew.
    Grid,
    /// Recursive four-way splits of crowded cells.
    QuadTree,
    /// Recursive median bisection on alternating axes.
    #[default]
    KdbTree,
    /// Equal-count ranges along a Hilbert curve.
    Hilbert,
}

/// Per-partition index structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Bounding-box hierarchy, better for skewed polygon sizes.
    #[default]
    RTree,
    /// Space hierarchy, simpler and well suited to points.
    QuadTree,
}

/// How two datasets are brought together for a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Both sides share one boundary set and are joined partition by partition.
    #[default]
    CoPartitioned,
    /// The smaller side is replicated to every partition of the other.
    Broadcast,
}

/// Binary spatial predicate evaluated between a left and a right geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpatialPredicate {
    #[default]
    Intersects,
    /// Left contains right.
    Contains,
    /// Left lies within right.
    Within,
    /// Euclidean distance between the geometries is at most `d` (inclusive).
    WithinDistance(f64),
}

impl SpatialPredicate {
    /// Distance by which candidate boxes must be expanded for this predicate.
    pub fn distance(&self) -> f64 {
        match self {
            SpatialPredicate::WithinDistance(d) => *d,
            _ => 0.0,
        }
    }

    /// The predicate with left and right swapped.
    pub fn flipped(&self) -> Self {
        match self {
            SpatialPredicate::Contains => SpatialPredicate::Within,
            SpatialPredicate::Within => SpatialPredicate::Contains,
            other => *other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let SpatialPredicate::WithinDistance(d) = self
            && (!d.is_finite() || *d < 0.0)
        {
            return Err(GeoshardError::invalid_config(format!(
                "within-distance must be finite and non-negative, got {d}"
            )));
        }
        Ok(())
    }
}

/// Options object for partitioning, indexing and joining.
///
/// # Example
///
/// ```rust
/// use geoshard::{Config, PartitioningScheme, SpatialPredicate};
///
/// let config = Config::default()
///     .with_partitioning_scheme(PartitioningScheme::QuadTree)
///     .with_num_partitions(64)
///     .with_seed(7);
/// assert!(config.validate().is_ok());
///
/// let json = r#"{
///     "partitioning_scheme": "hilbert",
///     "num_partitions": 8,
///     "predicate": { "within_distance": 2.5 }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.predicate, SpatialPredicate::WithinDistance(2.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub partitioning_scheme: PartitioningScheme,

    /// Target number of partitions (> 0)
    #[serde(default = "Config::default_num_partitions")]
    pub num_partitions: usize,

    /// Maximum number of bounding boxes drawn by the sampler (> 0)
    #[serde(default = "Config::default_sample_size")]
    pub sample_size: usize,

    #[serde(default)]
    pub index_type: IndexType,

    #[serde(default)]
    pub join_strategy: JoinStrategy,

    #[serde(default)]
    pub predicate: SpatialPredicate,

    /// Sampling seed; `None` seeds from entropy
    #[serde(default)]
    pub seed: Option<u64>,

    /// Maximum split depth of the quad-tree partitioner
    #[serde(default = "Config::default_quad_tree_max_depth")]
    pub quad_tree_max_depth: usize,

    /// KDB leaves holding at most this many samples are never split
    #[serde(default = "Config::default_kdb_min_leaf_samples")]
    pub kdb_min_leaf_samples: usize,

    /// Hilbert curve order (grid of 2^order x 2^order cells, 1-16)
    #[serde(default = "Config::default_hilbert_order")]
    pub hilbert_order: u32,

    /// Entries held by a quad-tree index node before it splits
    #[serde(default = "Config::default_index_node_capacity")]
    pub index_node_capacity: usize,

    /// Maximum depth of the quad-tree index
    #[serde(default = "Config::default_index_max_depth")]
    pub index_max_depth: usize,
}

impl Config {
    const fn default_num_partitions() -> usize {
        16
    }

    const fn default_sample_size() -> usize {
        10_000
    }

    const fn default_quad_tree_max_depth() -> usize {
        16
    }

    const fn default_kdb_min_leaf_samples() -> usize {
        1
    }

    const fn default_hilbert_order() -> u32 {
        8
    }

    const fn default_index_node_capacity() -> usize {
        32
    }

    const fn default_index_max_depth() -> usize {
        24
    }

    pub fn with_partitioning_scheme(mut self, scheme: PartitioningScheme) -> Self {
        self.partitioning_scheme = scheme;
        self
    }

    pub fn with_num_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    pub fn with_join_strategy(mut self, strategy: JoinStrategy) -> Self {
        self.join_strategy = strategy;
        self
    }

    pub fn with_predicate(mut self, predicate: SpatialPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Fix the sampling seed for reproducible partitionings.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_hilbert_order(mut self, order: u32) -> Self {
        self.hilbert_order = order;
        self
    }

    pub fn with_quad_tree_max_depth(mut self, depth: usize) -> Self {
        self.quad_tree_max_depth = depth;
        self
    }

    pub fn with_kdb_min_leaf_samples(mut self, samples: usize) -> Self {
        self.kdb_min_leaf_samples = samples;
        self
    }

    pub fn with_index_node_capacity(mut self, capacity: usize) -> Self {
        self.index_node_capacity = capacity;
        self
    }

    pub fn with_index_max_depth(mut self, depth: usize) -> Self {
        self.index_max_depth = depth;
        self
    }

    /// Resolve the seed, drawing one from entropy when none was configured.
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| fastrand::u64(..))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.num_partitions == 0 {
            return Err(GeoshardError::invalid_config(
                "num_partitions must be greater than zero",
            ));
        }
        if self.num_partitions > u32::MAX as usize {
            return Err(GeoshardError::invalid_config(
                "num_partitions does not fit a 32-bit partition id",
            ));
        }
        if self.sample_size == 0 {
            return Err(GeoshardError::invalid_config(
                "sample_size must be greater than zero",
            ));
        }
        if self.quad_tree_max_depth == 0 {
            return Err(GeoshardError::invalid_config(
                "quad_tree_max_depth must be greater than zero",
            ));
        }
        if self.kdb_min_leaf_samples == 0 {
            return Err(GeoshardError::invalid_config(
                "kdb_min_leaf_samples must be greater than zero",
            ));
        }
        if !(1..=16).contains(&self.hilbert_order) {
            return Err(GeoshardError::invalid_config(format!(
                "hilbert_order must be between 1 and 16, got {}",
                self.hilbert_order
            )));
        }
        if self.index_node_capacity == 0 || self.index_max_depth == 0 {
            return Err(GeoshardError::invalid_config(
                "index_node_capacity and index_max_depth must be greater than zero",
            ));
        }
        self.predicate.validate()
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| GeoshardError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GeoshardError::Serialization(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partitioning_scheme: PartitioningScheme::default(),
            num_partitions: Self::default_num_partitions(),
            sample_size: Self::default_sample_size(),
            index_type: IndexType::default(),
            join_strategy: JoinStrategy::default(),
            predicate: SpatialPredicate::default(),
            seed: None,
            quad_tree_max_depth: Self::default_quad_tree_max_depth(),
            kdb_min_leaf_samples: Self::default_kdb_min_leaf_samples(),
            hilbert_order: Self::default_hilbert_order(),
            index_node_capacity: Self::default_index_node_capacity(),
            index_max_depth: Self::default_index_max_depth(),
        }
    }
}
