//! Common test utilities for SQLite federation tests
//!
//! Provides shared helpers for:
//! - Creating on-disk hot/cold stores in a temp directory
//! - Writing a matching configuration file
//! - Building managers over those stores

#![allow(dead_code)]

use fedquery::config::{Config, SourceConfig};
use fedquery::{Document, FederatedManager, SqliteProvider, SqliteStore};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    pub manager: FederatedManager<Document>,
    pub hot: SqliteStore,
    pub cold: SqliteStore,
    pub dir: TempDir,
}

pub fn create_test_config(dir: &TempDir) -> Config {
    let config = Config::new(vec![
        SourceConfig {
            name: "default".to_string(),
            path: PathBuf::from("hot.db"),
        },
        SourceConfig {
            name: "cold".to_string(),
            path: PathBuf::from("cold.db"),
        },
    ]);
    config.save(dir.path()).expect("Failed to save config");
    config
}

pub fn create_fixture() -> Fixture {
    let dir = TempDir::new().expect("Failed to create temp dir");
    create_test_config(&dir);
    let config = Config::load_with_env(dir.path(), ".env.test").expect("Failed to load config");
    let provider = SqliteProvider::from_config(&config).expect("Failed to open sources");
    let hot = provider.store("default").unwrap().clone();
    let cold = provider.store("cold").unwrap().clone();
    let manager = FederatedManager::new(provider).with_sources(&config.source_names());
    Fixture {
        manager,
        hot,
        cold,
        dir,
    }
}

/// Hot: 1 type4, 4 type2. Cold: 2 type3, 3 type1.
pub fn create_ordered_fixture() -> Fixture {
    let fixture = create_fixture();
    fixture.hot.insert(&Document::new(1, json!({"type": "type4"}))).unwrap();
    fixture.cold.insert(&Document::new(2, json!({"type": "type3"}))).unwrap();
    fixture.cold.insert(&Document::new(3, json!({"type": "type1"}))).unwrap();
    fixture.hot.insert(&Document::new(4, json!({"type": "type2"}))).unwrap();
    fixture
}

pub fn types(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|d| d.get("type").as_str().unwrap_or_default().to_string())
        .collect()
}
