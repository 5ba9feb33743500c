//! Configuration loading for Glycora.
//! Reads glycora.toml from the current directory or path in GLYCORA_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_tables_dir")]
    pub dir: String,
}

fn default_tables_dir() -> String { "config".to_string() }

impl Default for TablesConfig {
    fn default() -> Self {
        TablesConfig { dir: default_tables_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool { true }

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig { pretty: default_pretty() }
    }
}

impl Config {
    /// Load configuration from glycora.toml.
    /// Checks GLYCORA_CONFIG env var first, then current directory.
    /// A missing file yields the defaults so the binary works out of the box.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("GLYCORA_CONFIG")
            .unwrap_or_else(|_| "glycora.toml".to_string());

        if !Path::new(&path).exists() {
            tracing::debug!("no {} found, using defaults", path);
            return Ok(Config {
                tables: TablesConfig::default(),
                output: OutputConfig::default(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
