//! Multi-source configuration loading.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. YAML file (explicit path, or `./conceptgraph.yaml` when present)
//! 3. `CONCEPTGRAPH_*` environment variables
//!
//! CLI flags are applied by the caller after loading.

use std::path::{Path, PathBuf};

use crate::error::{ConceptGraphError, Result};
use crate::graph::TraversalStrategy;

use super::schema::ConceptGraphConfig;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "conceptgraph.yaml";

pub const ENV_BIND: &str = "CONCEPTGRAPH_BIND";
pub const ENV_DB: &str = "CONCEPTGRAPH_DB";
pub const ENV_GRACEFUL_TIMEOUT_SECS: &str = "CONCEPTGRAPH_GRACEFUL_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "CONCEPTGRAPH_REQUEST_TIMEOUT_MS";
pub const ENV_STRATEGY: &str = "CONCEPTGRAPH_STRATEGY";
pub const ENV_MAX_DEPTH: &str = "CONCEPTGRAPH_MAX_DEPTH";

/// Load configuration from defaults, an optional YAML file, and the process
/// environment.
///
/// An explicit `file` must exist. Without one, `./conceptgraph.yaml` is used
/// if present and silently skipped otherwise.
pub fn load_config(file: Option<&Path>) -> Result<ConceptGraphConfig> {
    load_config_with(file, |key| std::env::var(key).ok())
}

/// Like [`load_config`], reading environment variables through `env`.
pub fn load_config_with<F>(file: Option<&Path>, env: F) -> Result<ConceptGraphConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let path = match file {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };

    let mut config = match path {
        Some(path) => {
            let config = read_yaml(&path)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            config
        }
        None => ConceptGraphConfig::default(),
    };

    apply_env(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

fn read_yaml(path: &Path) -> Result<ConceptGraphConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConceptGraphError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    if raw.trim().is_empty() {
        return Ok(ConceptGraphConfig::default());
    }
    serde_yaml::from_str(&raw)
        .map_err(|e| ConceptGraphError::Config(format!("invalid YAML in {}: {e}", path.display())))
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ConceptGraphError::Config(format!("{key}: cannot parse '{raw}'")))
}

fn apply_env<F>(config: &mut ConceptGraphConfig, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = env(ENV_BIND) {
        config.server.bind = bind;
    }
    if let Some(db) = env(ENV_DB) {
        config.store.path = PathBuf::from(db);
    }
    if let Some(raw) = env(ENV_GRACEFUL_TIMEOUT_SECS) {
        config.server.graceful_timeout_secs = parse_env(ENV_GRACEFUL_TIMEOUT_SECS, &raw)?;
    }
    if let Some(raw) = env(ENV_REQUEST_TIMEOUT_MS) {
        config.server.request_timeout_ms = parse_env(ENV_REQUEST_TIMEOUT_MS, &raw)?;
    }
    if let Some(raw) = env(ENV_STRATEGY) {
        config.traversal.strategy = TraversalStrategy::from_str_loose(&raw).ok_or_else(|| {
            ConceptGraphError::Config(format!("{ENV_STRATEGY}: unknown strategy '{raw}'"))
        })?;
    }
    if let Some(raw) = env(ENV_MAX_DEPTH) {
        config.traversal.max_depth = parse_env(ENV_MAX_DEPTH, &raw)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
