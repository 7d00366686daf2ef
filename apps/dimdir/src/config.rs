//! # Configuration
//!
//! Index settings come from an optional TOML file; server security settings
//! come from the environment.
//!
//! ```toml
//! data_dir = "/var/lib/dimdir"
//! database = "dimdir.redb"
//! blobs = "blobs"
//! granularity = "paragraph"
//! max_text_bytes = 1048576
//! ```
//!
//! ## Environment Variables
//!
//! - `DIMDIR_API_KEY`: If set, requires Bearer token authentication
//! - `DIMDIR_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `DIMDIR_CORS_ORIGINS`: Comma-separated allowed origins, or "*" for all
//! - `DIMDIR_LOG_FORMAT`: `json` for machine-parseable logs

use dimdir_core::primitives::MAX_DOCUMENT_BYTES;
use dimdir_core::{DimdirError, DocumentIndex, Granularity, IndexOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default rate limit when `DIMDIR_RATE_LIMIT` is unset or unparsable.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// =============================================================================
// INDEX CONFIGURATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DimdirConfig {
    pub data_dir: PathBuf,
    pub database: String,
    pub blobs: String,
    pub granularity: Granularity,
    /// Largest document accepted at the request boundary.
    pub max_text_bytes: usize,
}

impl Default for DimdirConfig {
    fn default() -> Self {
        let options = IndexOptions::default();
        Self {
            data_dir: options.data_dir,
            database: options.database,
            blobs: options.blobs,
            granularity: options.granularity,
            max_text_bytes: MAX_DOCUMENT_BYTES,
        }
    }
}

impl DimdirConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `load(path)` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".into()));
        }
        if self.blobs.trim().is_empty() {
            return Err(ConfigError::Invalid("blobs must not be empty".into()));
        }
        if self.database == self.blobs {
            return Err(ConfigError::Invalid(
                "database and blobs must name different paths".into(),
            ));
        }
        if self.max_text_bytes == 0 || self.max_text_bytes > MAX_DOCUMENT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "max_text_bytes must be between 1 and {MAX_DOCUMENT_BYTES}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            data_dir: self.data_dir.clone(),
            database: self.database.clone(),
            blobs: self.blobs.clone(),
            granularity: self.granularity,
        }
    }

    pub fn open_index(&self) -> Result<DocumentIndex, DimdirError> {
        DocumentIndex::open(&self.index_options())
    }
}

// =============================================================================
// SERVER SECURITY
// =============================================================================

/// Security layers of the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityConfig {
    /// Bearer key required on every route except `/health`.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables limiting.
    pub rate_limit: u32,
    /// Raw `DIMDIR_CORS_ORIGINS` value.
    pub cors_origins: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup("DIMDIR_API_KEY").filter(|k| !k.is_empty()),
            rate_limit: lookup("DIMDIR_RATE_LIMIT")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT),
            cors_origins: lookup("DIMDIR_CORS_ORIGINS"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dimdir.toml");
        std::fs::write(&path, "granularity = \"paragraph\"\ndata_dir = \"/tmp/x\"\n")
            .expect("write");

        let config = DimdirConfig::load(&path).expect("load");
        assert_eq!(config.granularity, Granularity::Paragraph);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.database, "dimdir.redb");
        assert_eq!(config.max_text_bytes, MAX_DOCUMENT_BYTES);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dimdir.toml");
        std::fs::write(&path, "granularity = \"sentence\"\ncolour = \"blue\"\n").expect("write");
        assert!(matches!(
            DimdirConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            DimdirConfig::load(Path::new("/nonexistent/dimdir.toml")),
            Err(ConfigError::Read { .. })
        ));
        assert_eq!(
            DimdirConfig::load_or_default(None).expect("default"),
            DimdirConfig::default()
        );
    }

    #[test]
    fn validation() {
        let mut config = DimdirConfig::default();
        assert!(config.validate().is_ok());
        config.max_text_bytes = 0;
        assert!(config.validate().is_err());
        config.max_text_bytes = 10;
        config.blobs = config.database.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn security_from_lookup() {
        let vars = BTreeMap::from([
            ("DIMDIR_API_KEY", ""),
            ("DIMDIR_RATE_LIMIT", "25"),
            ("DIMDIR_CORS_ORIGINS", "*"),
        ]);
        let security = SecurityConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(security.api_key, None);
        assert_eq!(security.rate_limit, 25);
        assert_eq!(security.cors_origins.as_deref(), Some("*"));

        let defaults = SecurityConfig::from_lookup(|_| None);
        assert_eq!(defaults, SecurityConfig::default());
    }
}
