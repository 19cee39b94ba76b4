use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use beacon::DiscoveryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub announce: Vec<AnnounceConfig>,
    #[serde(default)]
    pub discover: Vec<DiscoverConfig>,
}

/// A service this daemon announces
#[derive(Debug, Clone, Deserialize)]
pub struct AnnounceConfig {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Opaque payload served by the call endpoint for this service
    #[serde(default)]
    pub payload: Option<String>,
}

/// A service this daemon queries for
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_prune_after")]
    pub prune_after_secs: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_stale_after() -> u64 {
    60
}

fn default_prune_after() -> u64 {
    600
}

fn default_maintenance_interval() -> u64 {
    15
}

fn default_listen() -> String {
    "0.0.0.0:8053".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
            prune_after_secs: default_prune_after(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .discovery
            .validate()
            .with_context(|| format!("Invalid [discovery] section in {}", path.display()))?;
        if config.directory.maintenance_interval_secs == 0 {
            anyhow::bail!("directory.maintenance_interval_secs must be non-zero");
        }

        Ok(config)
    }
}
