//! fedquery - Federated queries over SQLite sources.
//!
//! Builds on `fedquery-core` with a SQLite backend, TOML configuration,
//! logging setup, and the `fedquery` command-line tool.

pub mod cli;
pub mod config;
pub mod logging;
pub mod sqlite;

pub use config::{Config, SourceConfig};
pub use fedquery_core::{
    Document, FederatedManager, FederatedQuery, FederationError, FederationResult, Predicate,
    Record, SourceQuery,
};
pub use sqlite::{SqliteProvider, SqliteSource, SqliteStore};
