//! Process configuration.
//!
//! TOML is the sole config source, following `forwarder::config`'s
//! raw/validated split — but unlike the forwarder, every field has a
//! built-in default, since spec.md only names "the persistence directory"
//! as an explicit startup option and puts flag-handling itself out of
//! scope. An absent config file is not an error.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// Where per-channel queue JSON files are written. `None` disables
    /// persistence entirely (spec §6: "Ignored entirely if no data
    /// directory is configured").
    pub data_dir: Option<PathBuf>,
    /// Bind address for the client-facing `/ws` listener.
    pub client_bind: String,
    /// Base URL the upstream karafun dialer connects to; `{channel}` is
    /// not interpolated into the URL itself — the channel travels in the
    /// `X-Karafun-Channel` header (spec §6).
    pub upstream_url: String,
    /// Pacing delay the reconciler sleeps after emitting a mutation,
    /// before re-evaluating (spec §4.4 and §9's "~1s, not load-bearing").
    pub reconcile_pacing_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            client_bind: "0.0.0.0:8066".to_owned(),
            upstream_url: "ws://localhost:8067/".to_owned(),
            reconcile_pacing_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    data_dir: Option<String>,
    client_bind: Option<String>,
    upstream_url: Option<String>,
    reconcile_pacing_ms: Option<u64>,
}

impl Config {
    /// Load from a TOML file at `path`. A missing file yields the default
    /// config; a present-but-malformed file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = Self::default();
        Ok(Self {
            data_dir: raw.data_dir.map(PathBuf::from).or(defaults.data_dir),
            client_bind: raw.client_bind.unwrap_or(defaults.client_bind),
            upstream_url: raw.upstream_url.unwrap_or(defaults.upstream_url),
            reconcile_pacing_ms: raw.reconcile_pacing_ms.unwrap_or(defaults.reconcile_pacing_ms),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}
