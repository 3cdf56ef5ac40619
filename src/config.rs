//! Configuration loaded from `regsync.toml`.
//!
//! Missing keys fall back to defaults. `REGSYNC_LOCAL_URL` and
//! `REGSYNC_SECRET` take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "regsync.toml";

/// Top-level configuration read from `regsync.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegsyncConfig {
    /// Number of workers, each running one job at a time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait for a worker before scheduling is refused.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Registry images are replicated from.
    #[serde(default = "default_local_registry_url")]
    pub local_registry_url: String,

    /// Service secret presented to the local registry.
    #[serde(default)]
    pub local_secret: String,

    /// Where per-job logs are written. Unset keeps them in the process log.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

// Default worker count: 3.
fn default_workers() -> usize {
    3
}

// Default queue capacity: 100 jobs.
fn default_queue_capacity() -> usize {
    100
}

// Default local registry: the `registry` service on port 5000.
fn default_local_registry_url() -> String {
    "http://registry:5000".to_string()
}

impl Default for RegsyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            local_registry_url: default_local_registry_url(),
            local_secret: String::new(),
            log_dir: None,
        }
    }
}

impl RegsyncConfig {
    /// Loads `path`, or the defaults if it does not exist, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<RegsyncConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        // Environment wins over the file for the local registry session.
        if let Ok(url) = std::env::var("REGSYNC_LOCAL_URL")
            && !url.is_empty()
        {
            config.local_registry_url = url;
        }
        if let Ok(secret) = std::env::var("REGSYNC_SECRET")
            && !secret.is_empty()
        {
            config.local_secret = secret;
        }

        if config.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        Ok(config)
    }
}
