//! Configuration for the scraper
//!
//! Loads configuration from config.yml file. The named channel/server tables
//! let users address well-known channels by name instead of raw snowflakes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default cache directory (fallback if config.yml not found)
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Channel scanned when neither -c nor --server is given
pub const DEFAULT_CHANNEL: &str = "support";

/// Lock file guarding the cache directory
pub const CACHE_LOCK_FILE: &str = ".rocketscrape.lock";

/// YAML config structure
#[derive(Debug, Deserialize)]
struct YamlConfig {
    token: Option<String>,
    cache_dir: Option<PathBuf>,
    channels: Option<HashMap<String, u64>>,
    servers: Option<HashMap<String, u64>>,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    /// API token from config.yml; DISCORD_USER_TOKEN takes precedence.
    pub token: Option<String>,
    pub cache_dir: PathBuf,
    /// Named channel table (name -> snowflake).
    pub channels: HashMap<String, u64>,
    /// Named server table (name -> snowflake).
    pub servers: HashMap<String, u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults.
    /// Environment variables take precedence over config.yml values.
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|| Self::load_from_file("../config.yml"))
            .unwrap_or_else(Self::defaults)
    }

    fn load_from_file(path: impl AsRef<Path>) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let yaml: YamlConfig = serde_yaml::from_str(&content).ok()?;

        let mut config = Self::defaults();
        if let Some(token) = yaml.token {
            config.token = Some(token);
        }
        if let Some(dir) = yaml.cache_dir {
            config.cache_dir = dir;
        }
        if let Some(channels) = yaml.channels {
            config.channels.extend(channels);
        }
        if let Some(servers) = yaml.servers {
            config.servers.extend(servers);
        }
        Some(config)
    }

    /// Built-in defaults: the channels the original scraper shipped with.
    pub fn defaults() -> Self {
        let mut channels = HashMap::new();
        channels.insert("general".to_string(), 704_196_071_881_965_589);
        channels.insert("trading".to_string(), 405_163_713_063_288_832);
        channels.insert("support".to_string(), 468_923_220_607_762_485);

        let mut servers = HashMap::new();
        servers.insert("rocket-pool".to_string(), 405_159_462_932_971_520);

        Self {
            token: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            channels,
            servers,
        }
    }

    /// Resolve the API token: environment first, then config.yml.
    pub fn api_token(&self) -> crate::error::Result<String> {
        if let Ok(token) = std::env::var("DISCORD_USER_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }
        self.token.clone().ok_or(crate::error::Error::MissingToken)
    }

    /// Sorted channel names, for help text.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted server names, for help text.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().cloned().collect();
        names.sort();
        names
    }
}
