//! Error types for partitioning, indexing and query operations.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoshardError>;

/// Errors surfaced by the partitioning engine.
///
/// Every variant is fatal for the call that produced it. The one recoverable
/// condition, geometries dropped outside every partition boundary, is not an
/// error: it is reported as a [`crate::assign::PartitionBuildWarning`].
#[derive(Debug, Error)]
pub enum GeoshardError {
    /// The source was empty but a partitioning was requested.
    #[error("insufficient data: cannot partition an empty source")]
    InsufficientData,

    /// Options or inputs that make the request impossible to run.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A single index query was malformed (e.g. NaN coordinates).
    #[error("index query error: {0}")]
    IndexQuery(String),

    /// Configuration could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl GeoshardError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn index_query(msg: impl Into<String>) -> Self {
        Self::IndexQuery(msg.into())
    }
}

impl From<serde_json::Error> for GeoshardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            GeoshardError::InsufficientData.to_string(),
            "insufficient data: cannot partition an empty source"
        );
        assert_eq!(
            GeoshardError::invalid_config("num_partitions must be > 0").to_string(),
            "invalid configuration: num_partitions must be > 0"
        );
        assert!(
            GeoshardError::index_query("NaN")
                .to_string()
                .contains("index query")
        );
    }
}
