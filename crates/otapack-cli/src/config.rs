use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use otapack_engine::WatchdogPolicy;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "otapack.toml";

/// Deployment configuration, read from `otapack.toml`:
///
/// ```toml
/// server_url = "https://updates.example.com/api"
/// app_id = "my-app"
/// channel = "production"
/// binary_version = "1.4.0"
/// client_id = "device-7f3a"
///
/// # optional
/// root = "/var/lib/my-app/updates"
/// entry_file = "index.bundle"
/// max_failed_boots = 2
/// confirmation_window_secs = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    pub server_url: String,
    pub app_id: String,
    pub channel: String,
    pub binary_version: String,
    pub client_id: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_entry_file")]
    pub entry_file: String,
    #[serde(default = "default_max_failed_boots")]
    pub max_failed_boots: u32,
    #[serde(default = "default_confirmation_window_secs")]
    pub confirmation_window_secs: u64,
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid configuration")
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".otapack"))
    }

    pub fn watchdog_policy(&self) -> WatchdogPolicy {
        WatchdogPolicy {
            max_failed_boots: self.max_failed_boots,
            confirmation_window: Duration::from_secs(self.confirmation_window_secs),
        }
    }
}

fn default_entry_file() -> String {
    otapack_engine::EngineConfig::DEFAULT_ENTRY_FILE.to_string()
}

fn default_max_failed_boots() -> u32 {
    WatchdogPolicy::default().max_failed_boots
}

fn default_confirmation_window_secs() -> u64 {
    WatchdogPolicy::default().confirmation_window.as_secs()
}
