use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What kind of probe a target expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Http,
    Ssh,
}

/// SSH connection parameters for `ssh` targets. Exactly one of `password`
/// or `key_file` is expected; the key file reference points at a key the
/// provisioning flow has already placed on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshParams {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

/// One monitored thing, as declared in the dashboard's configuration
/// document. The engine never creates or deletes targets; it only observes
/// the set the document currently holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshParams>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-target overrides; global settings apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl MonitorTarget {
    /// The human-readable address this target is probed at, used in
    /// notifications. `None` when the target has nothing usable configured.
    pub fn endpoint(&self) -> Option<String> {
        match self.kind {
            TargetKind::Http => self.url.clone().filter(|u| !u.is_empty()),
            TargetKind::Ssh => self
                .ssh
                .as_ref()
                .filter(|s| !s.host.is_empty())
                .map(|s| format!("{}:{}", s.host, s.port)),
        }
    }

    /// Whether the target can be scheduled at all. Endpoint-less targets are
    /// never given a timer.
    pub fn is_probeable(&self) -> bool {
        self.endpoint().is_some()
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }

    pub fn interval_secs(&self, global: &MonitoringSettings) -> u64 {
        self.interval.unwrap_or(global.interval).max(1)
    }

    pub fn timeout_secs(&self, global: &MonitoringSettings) -> u64 {
        self.timeout.unwrap_or(global.timeout).max(1)
    }

    pub fn retry_count(&self, global: &MonitoringSettings) -> u32 {
        self.retries.unwrap_or(global.retries)
    }
}

/// Global monitoring settings. Changes here only take effect through
/// `Monitor::restart`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub enabled: bool,
    /// Seconds between checks of one target.
    pub interval: u64,
    /// Seconds before a single probe attempt is abandoned.
    pub timeout: u64,
    /// Extra probe attempts after a failed one.
    pub retries: u32,
    /// Checks older than this are dropped at start/restart.
    pub history_days: i64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self { enabled: true, interval: 60, timeout: 5, retries: 2, history_days: 30 }
    }
}

/// Telegram notification settings, including the per-edge gates and the
/// optional per-edge chat routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub notify_down: bool,
    pub notify_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up_chat_id: Option<String>,
    pub daily_summary: bool,
    /// Local time of day, `HH:MM`.
    pub daily_summary_time: String,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            notify_down: true,
            notify_up: true,
            down_chat_id: None,
            up_chat_id: None,
            daily_summary: false,
            daily_summary_time: "09:00".to_string(),
        }
    }
}

/// The slice of the dashboard's configuration document the engine consumes.
/// The document itself is owned and rewritten by the external CRUD layer;
/// unknown fields are ignored on load and never written back from here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub targets: Vec<MonitorTarget>,
    pub monitoring: MonitoringSettings,
    pub telegram: TelegramSettings,
}

/// Shared, concurrency-safe handle to the latest configuration. Ticks read
/// through this on every firing, so CRUD edits take effect without restarting
/// any timer.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<DashboardConfig>>,
}

impl SharedConfig {
    pub fn new(config: DashboardConfig) -> Self {
        Self { inner: Arc::new(RwLock::new(config)) }
    }

    /// Load the configuration document, creating a default one when the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let raw = fs::read_to_string(path)?;
            let config = serde_json::from_str(&raw)?;
            Ok(Self::new(config))
        } else {
            let config = DashboardConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, serde_json::to_string_pretty(&config)?)?;
            Ok(Self::new(config))
        }
    }

    /// Point-in-time snapshot of the whole document.
    pub fn read(&self) -> DashboardConfig {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the document wholesale. Used by the CRUD layer after a write.
    pub fn replace(&self, config: DashboardConfig) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Resolve one target by id from the latest document.
    pub fn target(&self, id: &str) -> Option<MonitorTarget> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Targets currently eligible for scheduling, keyed by id.
    pub fn schedulable_targets(&self) -> HashMap<String, MonitorTarget> {
        self.read()
            .targets
            .into_iter()
            .filter(|t| t.enabled && t.is_probeable())
            .map(|t| (t.id.clone(), t))
            .collect()
    }
}

fn default_true() -> bool {
    true
}
