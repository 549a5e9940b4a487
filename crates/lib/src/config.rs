//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.blc/config.json`) and environment.
//! Every field has a default, so a missing file runs the module with defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Module identity and queueing.
    #[serde(default)]
    pub module: ModuleConfig,

    /// HTTP bridge transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Module name and inbound queue size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// Module name reported in logs and health (default "blc").
    #[serde(default = "default_module_name")]
    pub name: String,

    /// Bound of the inbound event queue (default 64). Transports wait when it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Where the HTTP bridge listens and where it delivers outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_transport_bind")]
    pub bind: String,

    /// Listen port (default 15161).
    #[serde(default = "default_transport_port")]
    pub port: u16,

    /// Base URL outputs are POSTed to (`{outputUrl}/outputs/{name}`).
    /// Overridden by BLC_OUTPUT_URL env. When unset, outputs are only logged.
    pub output_url: Option<String>,
}

fn default_module_name() -> String {
    "blc".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_transport_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_transport_port() -> u16 {
    15161
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: default_module_name(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: default_transport_bind(),
            port: default_transport_port(),
            output_url: None,
        }
    }
}

impl TransportConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind.trim(), self.port)
    }
}

/// Resolve the output URL: env BLC_OUTPUT_URL overrides config.
pub fn resolve_output_url(config: &Config) -> Option<String> {
    std::env::var("BLC_OUTPUT_URL")
        .ok()
        .and_then(|s| non_empty(&s))
        .or_else(|| config.transport.output_url.as_deref().and_then(non_empty))
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BLC_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".blc").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or BLC_CONFIG_PATH).
/// Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
