//! Engine configuration
//!
//! Loaded in layers, later layers winning:
//!
//! 1. Defaults
//! 2. A TOML file, if present
//! 3. `STATEGRAPH_*` environment variables
//!
//! ```toml
//! [database]
//! backend = "sqlite"
//! path = "stategraph.db"
//!
//! [execution]
//! max_steps = 25
//! failure_policy = "capture"
//! error_field = "error"
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{GraphError, Result};
use crate::graph::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Where checkpoints and memory items are kept
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(GraphError::Configuration(format!(
                "Unknown backend '{}', expected 'sqlite' or 'memory'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    /// Database file path
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            path: "stategraph.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Steps a single run call may execute before failing with `RecursionLimit`
    pub max_steps: usize,
    /// Policy for nodes without their own
    pub failure_policy: FailurePolicy,
    /// Field receiving captured node failures
    pub error_field: String,
    /// Checkpoints fetched per page when reading history
    pub history_page_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            failure_policy: FailurePolicy::Propagate,
            error_field: "error".to_string(),
            history_page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Dotted paths embedded when the store is indexed
    pub index_fields: Vec<String>,
    /// Expected embedding length; checked against the injected index
    pub dims: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_fields: vec!["text".to_string()],
            dims: None,
        }
    }
}

/// Loads [`EngineConfig`] from defaults, a file and the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this TOML file on [`load`](Self::load); a missing file is skipped
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub async fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.path {
            Some(path) => Self::load_from_path(path).await?.unwrap_or_default(),
            None => EngineConfig::default(),
        };

        Self::apply_env(&mut config, |name| std::env::var(name).ok())?;

        info!(
            backend = ?config.database.backend,
            path = %config.database.path,
            max_steps = config.execution.max_steps,
            "Configuration loaded"
        );
        Ok(config)
    }

    async fn load_from_path(path: &Path) -> Result<Option<EngineConfig>> {
        if !fs::try_exists(path).await? {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            GraphError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            GraphError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(Some(config))
    }

    /// Apply `STATEGRAPH_*` overrides read through `lookup`
    pub fn apply_env<F>(config: &mut EngineConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STATEGRAPH_DATABASE_PATH") {
            config.database.path = path;
        }
        if let Some(backend) = lookup("STATEGRAPH_DATABASE_BACKEND") {
            config.database.backend = backend.parse()?;
        }
        if let Some(max_steps) = lookup("STATEGRAPH_MAX_STEPS") {
            config.execution.max_steps = max_steps.parse().map_err(|_| {
                GraphError::Configuration(format!(
                    "STATEGRAPH_MAX_STEPS must be a positive integer, got '{}'",
                    max_steps
                ))
            })?;
        }
        if let Some(level) = lookup("STATEGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database.backend, Backend::Sqlite);
        assert_eq!(config.database.path, "stategraph.db");
        assert_eq!(config.execution.max_steps, 25);
        assert_eq!(config.execution.failure_policy, FailurePolicy::Propagate);
        assert_eq!(config.execution.error_field, "error");
        assert_eq!(config.store.index_fields, vec!["text".to_string()]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
[execution]
failure_policy = "capture"

[database]
backend = "memory"
"#,
        )
        .unwrap();

        assert_eq!(config.execution.failure_policy, FailurePolicy::Capture);
        assert_eq!(config.execution.max_steps, 25);
        assert_eq!(config.database.backend, Backend::Memory);
        assert_eq!(config.database.max_connections, 5);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_file(temp_dir.path().join("absent.toml"))
            .load()
            .await
            .unwrap();
        assert_eq!(config.execution.error_field, "error");
    }

    #[tokio::test]
    async fn test_invalid_file_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[execution\nmax_steps = ").await.unwrap();

        let err = ConfigLoader::new().with_file(&path).load().await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_file_values_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stategraph.toml");
        fs::write(&path, "[execution]\nmax_steps = 7\n[logging]\nlevel = \"debug\"\n")
            .await
            .unwrap();

        let config = ConfigLoader::new().with_file(&path).load().await.unwrap();
        assert_eq!(config.execution.max_steps, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STATEGRAPH_DATABASE_PATH", "/tmp/override.db"),
            ("STATEGRAPH_DATABASE_BACKEND", "memory"),
            ("STATEGRAPH_MAX_STEPS", "3"),
            ("STATEGRAPH_LOG_LEVEL", "trace"),
        ]);
        let mut config = EngineConfig::default();
        ConfigLoader::apply_env(&mut config, |name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.database.backend, Backend::Memory);
        assert_eq!(config.execution.max_steps, 3);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = EngineConfig::default();
        let err = ConfigLoader::apply_env(&mut config, |name| {
            (name == "STATEGRAPH_MAX_STEPS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, GraphError::Configuration(_)));
    }
}
