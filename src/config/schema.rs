//! Configuration data structures for ConceptGraph.
//!
//! Defines the YAML config format: server binding and timeouts, the store
//! location, and traversal limits. Every field has a default, so an empty
//! file (or no file at all) is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConceptGraphError, Result};
use crate::graph::TraversalStrategy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for ConceptGraph.
///
/// Loaded from a YAML file and `CONCEPTGRAPH_*` environment variables; CLI
/// flags are applied on top by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptGraphConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub traversal: TraversalConfig,
}

impl ConceptGraphConfig {
    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(ConceptGraphError::Config(
                "server.bind must not be empty".into(),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConceptGraphError::Config(
                "server.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.traversal.max_depth < 0 {
            return Err(ConceptGraphError::Config(format!(
                "traversal.max_depth must be non-negative, got {}",
                self.traversal.max_depth
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// How long shutdown waits for in-flight requests.
    #[serde(default = "default_graceful_timeout_secs")]
    pub graceful_timeout_secs: u64,

    /// Deadline applied to every store-backed request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerConfig {
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            graceful_timeout_secs: default_graceful_timeout_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// TraversalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalConfig {
    #[serde(default)]
    pub strategy: TraversalStrategy,

    /// Largest depth a client may request.
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            strategy: TraversalStrategy::default(),
            max_depth: default_max_depth(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_graceful_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_max_depth() -> i64 {
    10
}

/// `concepts.db` under the platform data directory, or the working
/// directory when no home directory can be determined.
pub fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "conceptgraph")
        .map(|dirs| dirs.data_dir().join("concepts.db"))
        .unwrap_or_else(|| PathBuf::from("concepts.db"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
