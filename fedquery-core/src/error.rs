//! Error types for fedquery-core.
//!
//! Backends report their own failures through the same enum so that
//! per-source errors reach the caller unchanged.

use thiserror::Error;

/// Federation error type
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("No record matched: {0}")]
    NotFound(String),

    #[error("Multiple records returned: {0}")]
    MultipleResultsFound(String),

    #[error("Source '{0}' is not registered")]
    UnknownSource(String),

    #[error("No sources registered")]
    EmptyRegistry,

    #[error("No default source: {0}")]
    NoDefaultSource(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for federation operations
pub type FederationResult<T> = Result<T, FederationError>;

impl FederationError {
    /// True for the "zero matches" signal that `get` absorbs per source.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FederationError::NotFound(_))
    }
}

impl serde::Serialize for FederationError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
