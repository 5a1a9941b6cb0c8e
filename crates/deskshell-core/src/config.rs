use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::preview::MAX_PREVIEW_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Where the bridge listens for the UI process (loopback only)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Dev server to load instead of the bundle in development
    #[serde(default = "default_dev_url")]
    pub dev_url: String,

    /// Force development mode (also `DESKSHELL_DEV=1`)
    #[serde(default)]
    pub dev: bool,

    /// Built UI bundle; defaults to `out/` next to the executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_dir: Option<PathBuf>,

    /// Program + args that open the UI window. Empty runs headless.
    #[serde(default)]
    pub ui_command: Vec<String>,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Size cap for binary and document previews
    #[serde(default = "default_max_preview_bytes")]
    pub max_preview_bytes: u64,

    /// Kill shell commands running longer than this. Unset means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

fn default_listen_addr() -> String {
    "127.0.0.1:0".to_string()
}
fn default_dev_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_window_width() -> u32 {
    1400
}
fn default_window_height() -> u32 {
    1000
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_max_preview_bytes() -> u64 {
    MAX_PREVIEW_BYTES
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            dev_url: default_dev_url(),
            dev: false,
            bundle_dir: None,
            ui_command: Vec::new(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_preview_bytes: default_max_preview_bytes(),
            command_timeout_secs: None,
        }
    }
}

impl HostConfig {
    /// Default config file path for this platform
    pub fn default_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "deskshell", "deskshell") {
            dirs.config_dir().join("config.json")
        } else {
            PathBuf::from("deskshell-config.json")
        }
    }

    /// Load config from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&data).with_context(|| "failed to parse config JSON")?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file path
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    pub fn bundle_dir(&self) -> PathBuf {
        if let Some(dir) = &self.bundle_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("out")))
            .unwrap_or_else(|| PathBuf::from("out"))
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Dev mode from the config flag or the environment
    pub fn is_dev(&self) -> bool {
        self.dev
            || std::env::var("DESKSHELL_DEV").map(|v| v == "1").unwrap_or(false)
            || std::env::var("NODE_ENV").map(|v| v == "development").unwrap_or(false)
    }
}
