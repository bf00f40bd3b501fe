//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compose::RuntimeOptions;
use crate::errors::DockhandError;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;

/// dockhand settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Parent of workload working directories; defaults to `{base}/workspace`
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Deadline for every git operation
    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    /// age identity file; defaults to `{base}/key.txt`
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub poller: PollerSettings,

    /// Also write daily rolling log files here
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub json_logs: bool,
}

fn default_git_timeout() -> u64 {
    120
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            workspace_dir: None,
            git_timeout_secs: default_git_timeout(),
            key_file: None,
            runtime: RuntimeSettings::default(),
            server: ServerSettings::default(),
            poller: PollerSettings::default(),
            log_dir: None,
            json_logs: false,
        }
    }
}

impl Settings {
    /// Read the settings file; a missing file means defaults
    pub async fn load(layout: &StorageLayout) -> Result<Self, DockhandError> {
        let file = layout.settings_file();
        if !file.exists().await {
            info!(
                "No settings file at {}, using defaults",
                file.path().display()
            );
            return Ok(Self::default());
        }

        file.read_json().await.map_err(|e| {
            DockhandError::ConfigError(format!(
                "Failed to read settings {}: {}",
                file.path().display(),
                e
            ))
        })
    }

    pub fn workspace_dir(&self, layout: &StorageLayout) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| layout.workspace_dir().path().to_path_buf())
    }

    pub fn key_file(&self, layout: &StorageLayout) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| layout.key_file().path().to_path_buf())
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

/// Container runtime binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_runtime_binary")]
    pub binary: String,

    #[serde(default = "default_runtime_subcommand")]
    pub subcommand: Vec<String>,
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_runtime_subcommand() -> Vec<String> {
    vec!["compose".to_string()]
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            binary: default_runtime_binary(),
            subcommand: default_runtime_subcommand(),
        }
    }
}

impl From<&RuntimeSettings> for RuntimeOptions {
    fn from(settings: &RuntimeSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            subcommand: settings.subcommand.clone(),
        }
    }
}

/// Local HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8420
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Auto-deploy poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_poll_interval(),
        }
    }
}
