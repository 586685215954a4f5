//! Configuration module for rulewatch.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RULEWATCH_` and use double
//! underscores to separate nested levels:
//! - `RULEWATCH_RELOAD__DEBOUNCE_MS=250` sets `reload.debounce_ms`
//! - `RULEWATCH_COLLECT__QUEUE_CAPACITY=4096` sets `collect.queue_capacity`
//! - `RULEWATCH_LOGGING__DEFAULT=info` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "rulewatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File watching defaults
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Collect store tuning
    #[serde(default)]
    pub collect: CollectConfig,

    /// Named domain rule providers
    #[serde(default, rename = "domain_set")]
    pub domain_sets: Vec<DomainSetArgs>,

    /// Named IP rule providers
    #[serde(default, rename = "ip_set")]
    pub ip_sets: Vec<IpSetArgs>,

    /// Hosts override tables
    #[serde(default)]
    pub hosts: Vec<HostsArgs>,

    /// Traffic-driven collect actions
    #[serde(default, rename = "collect_action")]
    pub collect_actions: Vec<CollectArgs>,

    /// Threat-intel gates
    #[serde(default)]
    pub intel: Vec<IntelArgs>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `rulewatch::collect = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReloadConfig {
    /// Settling window for file change bursts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Treat rename-onto-path as a change (atomic replace by editors and stores)
    #[serde(default = "default_true")]
    pub include_rename: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollectConfig {
    /// Bound of the durable write queue per store
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Enqueue retry policy for appends
    #[serde(default = "default_add_retry")]
    pub add_retry: RetryPolicy,

    /// Enqueue retry policy for rewrites
    #[serde(default = "default_delete_retry")]
    pub delete_retry: RetryPolicy,
}

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DomainSetArgs {
    pub tag: String,
    #[serde(default)]
    pub exps: Vec<String>,
    #[serde(default)]
    pub sets: Vec<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub auto_reload: bool,
    /// Overrides `reload.debounce_ms` for this set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct IpSetArgs {
    pub tag: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub sets: Vec<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub auto_reload: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct HostsArgs {
    pub tag: String,
    #[serde(default)]
    pub entries: Vec<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub auto_reload: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CollectArgs {
    pub tag: String,
    pub file_path: PathBuf,
    /// `domain`, `full` or `keyword`; anything else falls back to `full`
    #[serde(default)]
    pub format: String,
    /// `add` or `delete`; anything else falls back to `add`
    #[serde(default)]
    pub operation: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct IntelArgs {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist_file: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub auto_reload: bool,
}

// Default value functions
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_add_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        backoff_ms: 10,
    }
}
fn default_delete_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 5,
        backoff_ms: 50,
    }
}
fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            include_rename: true,
        }
    }
}

impl ReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Per-plugin override, falling back to the global debounce.
    pub fn debounce_for(&self, override_ms: Option<u64>) -> Duration {
        override_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.debounce())
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            add_retry: default_add_retry(),
            delete_retry: default_delete_retry(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, using `rulewatch.toml` in the
    /// current directory when present.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed("RULEWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with a commented example.
    pub fn init_config_file(
        path: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = path.as_ref().to_path_buf();

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut content = toml::to_string_pretty(&Settings::default())?;
        content.push_str(EXAMPLE_PLUGINS);
        std::fs::write(&config_path, content)?;

        Ok(config_path)
    }
}

const EXAMPLE_PLUGINS: &str = r#"
# Plugins are built in the order they appear; a set can only reference
# tags declared above it.
#
# [[domain_set]]
# tag = "ads"
# exps = ["domain:doubleclick.net"]
# files = ["/etc/rulewatch/ads.txt"]
# auto_reload = true
#
# [[domain_set]]
# tag = "blocked"
# sets = ["ads"]
# files = ["/var/lib/rulewatch/collected.txt"]
# auto_reload = true
#
# [[ip_set]]
# tag = "private"
# ips = ["10.0.0.0/8", "192.168.0.0/16"]
#
# [[hosts]]
# tag = "lan"
# entries = ["router.lan 192.168.1.1"]
#
# [[collect_action]]
# tag = "collect_blocked"
# file_path = "/var/lib/rulewatch/collected.txt"
# format = "full"
# operation = "add"
"#;
