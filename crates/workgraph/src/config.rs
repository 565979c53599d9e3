//! Storage configuration.
//!
//! Hosts either build a [`StorageConfig`] in code or load one from a YAML
//! file. Missing keys fall back to the defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database file; created on first open.
    pub database_path: PathBuf,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long a connection waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("workgraph.db"),
            max_connections: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config: StorageConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config YAML {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = StorageConfig::default();
        assert_eq!(config.max_connections, DEFAULT_POOL_SIZE);
        assert_eq!(config.database_path, PathBuf::from("workgraph.db"));
    }

    #[test]
    fn loads_partial_yaml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path: /tmp/graph.db").unwrap();

        let config = StorageConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/graph.db"));
        assert_eq!(config.max_connections, DEFAULT_POOL_SIZE);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_connections: [not a number").unwrap();

        assert!(StorageConfig::load_from_file(file.path()).is_err());
    }
}
