//! Service configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables and CLI
//! flags. Every section has defaults, so an empty file is a valid config.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::search::{IndexKind, RetrievalSettings, DEFAULT_MODEL, EMBEDDING_DIM};

/// Environment variable overriding `roster.path`
pub const ENV_ROSTER_PATH: &str = "STAFFING_ROSTER_PATH";

/// Environment variable overriding `embedding.model`
pub const ENV_EMBEDDING_MODEL: &str = "STAFFING_EMBEDDING_MODEL";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub roster: RosterConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the API binds to
    pub listen_address: String,
    /// Attach a CORS layer
    pub cors_enabled: bool,
    /// Allowed origins; `*` allows any origin
    pub cors_origins: Vec<String>,
    /// Global request budget per second. Unset disables rate limiting.
    pub rate_limit_per_sec: Option<u32>,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8000".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            rate_limit_per_sec: None,
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// JSON document with an `employees` array
    pub path: PathBuf,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/employees.json"),
        }
    }
}

/// Which embedding backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Pretrained sentence-embedding model
    #[serde(rename = "fastembed")]
    FastEmbed,
    /// Feature hashing, no model download
    Hash,
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        if cfg!(feature = "fastembed") {
            EmbeddingBackend::FastEmbed
        } else {
            EmbeddingBackend::Hash
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Model identifier for the fastembed backend
    pub model: String,
    /// Vector length for the hash backend
    pub dimension: usize,
    /// Where downloaded model files are kept
    pub cache_dir: Option<PathBuf>,
    /// Cached query embeddings; 0 disables the cache
    pub cache_capacity: u64,
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: DEFAULT_MODEL.to_string(),
            dimension: EMBEDDING_DIM,
            cache_dir: None,
            cache_capacity: 1_000,
            cache_ttl_secs: 3_600,
        }
    }
}

impl ServiceConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Apply `STAFFING_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_ROSTER_PATH).filter(|v| !v.trim().is_empty()) {
            debug!(path = %path, "Roster path overridden from environment");
            self.roster.path = PathBuf::from(path);
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL).filter(|v| !v.trim().is_empty()) {
            debug!(model = %model, "Embedding model overridden from environment");
            self.embedding.model = model;
        }
    }

    /// Reject values that would only fail later at startup or on a request.
    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                Error::Config(format!(
                    "server.listen_address '{}' is not a socket address: {}",
                    self.server.listen_address, e
                ))
            })?;
        if self.server.rate_limit_per_sec == Some(0) {
            return Err(Error::Config(
                "server.rate_limit_per_sec must be positive when set".into(),
            ));
        }

        if self.embedding.model.trim().is_empty() {
            return Err(Error::Config("embedding.model must not be empty".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".into()));
        }

        let retrieval = &self.retrieval;
        if retrieval.default_k == 0 {
            return Err(Error::Config("retrieval.default_k must be at least 1".into()));
        }
        if retrieval.max_k < retrieval.default_k {
            return Err(Error::Config(
                "retrieval.max_k must not be smaller than retrieval.default_k".into(),
            ));
        }
        if let Some(floor) = retrieval.min_score {
            if !floor.is_finite() {
                return Err(Error::Config("retrieval.min_score must be finite".into()));
            }
        }
        if retrieval.embed_timeout_ms == 0 {
            return Err(Error::Config(
                "retrieval.embed_timeout_ms must be positive".into(),
            ));
        }
        if retrieval.index.kind == IndexKind::Partitioned && retrieval.index.nprobe == 0 {
            return Err(Error::Config("retrieval.index.nprobe must be at least 1".into()));
        }
        if retrieval.index.partitions == Some(0) {
            return Err(Error::Config(
                "retrieval.index.partitions must be positive when set".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Metric;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.listen_address, "0.0.0.0:8000");
        assert_eq!(config.roster.path, PathBuf::from("data/employees.json"));
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.retrieval.default_k, 3);
        assert_eq!(config.retrieval.min_score, None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ServiceConfig::default();
        config.embedding.backend = EmbeddingBackend::Hash;
        config.retrieval.min_score = Some(0.3);
        config.retrieval.index.kind = IndexKind::Partitioned;
        config.retrieval.index.metric = Metric::SquaredEuclidean;
        config.server.rate_limit_per_sec = Some(25);
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [retrieval]
            default_k = 5

            [embedding]
            backend = "hash"
            dimension = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hash);
        assert_eq!(config.embedding.dimension, 256);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_index_section_parses_snake_case() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [retrieval.index]
            kind = "partitioned"
            metric = "squared_euclidean"
            nprobe = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.index.kind, IndexKind::Partitioned);
        assert_eq!(config.retrieval.index.metric, Metric::SquaredEuclidean);
        assert_eq!(config.retrieval.index.nprobe, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ServiceConfig::default();
        config.server.listen_address = "not an address".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ServiceConfig::default();
        config.retrieval.default_k = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.retrieval.min_score = Some(f32::INFINITY);
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.server.rate_limit_per_sec = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nlisten_address = ").unwrap();

        assert!(matches!(ServiceConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides_replace_roster_and_model() {
        let vars: HashMap<&str, &str> = [
            (ENV_ROSTER_PATH, "/srv/roster.json"),
            (ENV_EMBEDDING_MODEL, "bge-small-en"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.roster.path, PathBuf::from("/srv/roster.json"));
        assert_eq!(config.embedding.model, "bge-small-en");
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let mut config = ServiceConfig::default();
        config.apply_overrides(|_| Some("  ".to_string()));
        assert_eq!(config.roster.path, PathBuf::from("data/employees.json"));
    }
}
