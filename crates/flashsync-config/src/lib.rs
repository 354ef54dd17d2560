//! Configuration for flashsync.
//!
//! A flat TOML file plus `FLASHSYNC_*` environment overrides, validated and
//! translated to `flashsync_core::SyncConfig`. The state and lock files
//! live next to the configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use flashsync_core::{DeviceConfig, RemoteConfig, SyncConfig, Timeouts};

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "FLASHSYNC_";

pub const STATE_FILE: &str = "state.toml";
pub const LOCK_FILE: &str = "flashsync.lock";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .keys.join(", "))]
    Missing { keys: Vec<&'static str> },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Raw settings as read from file and environment.
///
/// Required keys are `Option`s so that every missing one can be reported
/// at once.
#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    // ── Card ──
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub device_ssid: Option<String>,

    /// WPA passphrase of the card's access point.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing)]
    pub device_password: Option<String>,

    /// Directory on the card holding the logs.
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub device_dir: Option<String>,

    #[serde(default = "default_device_address")]
    pub device_address: String,

    // ── Host ──
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub home_ssid: Option<String>,

    #[serde(default = "default_wifi_interface")]
    pub wifi_interface: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,

    // ── Collector ──
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub remote_host: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_dir: Option<String>,

    #[serde(default = "default_ssh_key_path")]
    pub ssh_key_path: String,

    // ── Tuning ──
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    /// Newest local logs kept after relay.
    #[serde(default = "default_retention_count")]
    pub retention_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_ssid: None,
            device_password: None,
            device_dir: None,
            device_address: default_device_address(),
            home_ssid: None,
            wifi_interface: default_wifi_interface(),
            local_dir: None,
            remote_host: None,
            remote_user: None,
            remote_dir: None,
            ssh_key_path: default_ssh_key_path(),
            cooldown_minutes: default_cooldown_minutes(),
            download_timeout_secs: default_download_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            retention_count: default_retention_count(),
        }
    }
}

fn default_device_address() -> String {
    "192.168.0.1".into()
}
fn default_wifi_interface() -> String {
    "wlan0".into()
}
fn default_ssh_key_path() -> String {
    "~/.ssh/id_ed25519".into()
}
fn default_cooldown_minutes() -> u64 {
    30
}
fn default_download_timeout_secs() -> u64 {
    120
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_transfer_timeout_secs() -> u64 {
    60
}
fn default_retention_count() -> usize {
    10
}

/// Accept bare numbers and booleans where a string is expected.
///
/// Environment values like `FLASHSYNC_DEVICE_PASSWORD=12345678` arrive
/// as integers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Bool(b) => b.to_string(),
    }))
}

// ── Paths ───────────────────────────────────────────────────────────

/// Default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "flashsync").map_or_else(
        || home_dir().join(".config/flashsync/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// State file next to `config`.
pub fn state_path(config: &Path) -> PathBuf {
    sibling(config, STATE_FILE)
}

/// Lock file next to `config`.
pub fn lock_path(config: &Path) -> PathBuf {
    sibling(config, LOCK_FILE)
}

fn sibling(config: &Path, name: &str) -> PathBuf {
    match config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

fn home_dir() -> PathBuf {
    BaseDirs::new().map_or_else(
        || PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into())),
        |dirs| dirs.home_dir().to_path_buf(),
    )
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        home_dir()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Layered sources: defaults, then the TOML file, then `FLASHSYNC_*`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]))
}

/// Load raw settings from `path` and the environment.
///
/// A missing file is not an error here: every setting can come from the
/// environment. `validate` reports what is still missing.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    Ok(figment(path).extract()?)
}

/// Load, validate and translate in one step, creating `local_dir`.
pub fn load(path: &Path, resync: bool) -> Result<SyncConfig, ConfigError> {
    let config = load_settings(path)?.into_sync_config(path, resync)?;
    std::fs::create_dir_all(&config.local_dir)?;
    Ok(config)
}

fn present(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn required(value: Option<String>) -> String {
    value.unwrap_or_default()
}

impl Settings {
    /// Check every required key and numeric bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys: Vec<&'static str> = [
            ("device_ssid", self.device_ssid.as_ref()),
            ("device_password", self.device_password.as_ref()),
            ("device_dir", self.device_dir.as_ref()),
            ("home_ssid", self.home_ssid.as_ref()),
            ("local_dir", self.local_dir.as_ref()),
            ("remote_host", self.remote_host.as_ref()),
            ("remote_user", self.remote_user.as_ref()),
            ("remote_dir", self.remote_dir.as_ref()),
        ]
        .into_iter()
        .filter(|(_, value)| !present(*value))
        .map(|(key, _)| key)
        .collect();
        if !keys.is_empty() {
            return Err(ConfigError::Missing { keys });
        }

        for (field, value) in [
            ("download_timeout_secs", self.download_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("transfer_timeout_secs", self.transfer_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be at least 1 second".into(),
                });
            }
        }

        if self.device_ssid == self.home_ssid {
            return Err(ConfigError::Validation {
                field: "device_ssid".into(),
                reason: "must differ from home_ssid".into(),
            });
        }

        if self.wifi_interface.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "wifi_interface".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Validate and build the core run configuration.
    ///
    /// `config_path` anchors the state and lock files.
    pub fn into_sync_config(
        self,
        config_path: &Path,
        resync: bool,
    ) -> Result<SyncConfig, ConfigError> {
        self.validate()?;

        Ok(SyncConfig {
            device: DeviceConfig {
                ssid: required(self.device_ssid),
                password: SecretString::from(required(self.device_password)),
                address: self.device_address,
                directory: required(self.device_dir),
            },
            home_ssid: required(self.home_ssid),
            interface: self.wifi_interface,
            local_dir: expand_home(&required(self.local_dir)),
            remote: RemoteConfig {
                host: required(self.remote_host),
                user: required(self.remote_user),
                directory: required(self.remote_dir),
                identity_file: expand_home(&self.ssh_key_path),
            },
            cooldown: Duration::from_secs(self.cooldown_minutes * 60),
            retention: self.retention_count,
            timeouts: Timeouts {
                connect: Duration::from_secs(self.connect_timeout_secs),
                download: Duration::from_secs(self.download_timeout_secs),
                transfer: Duration::from_secs(self.transfer_timeout_secs),
                ..Timeouts::default()
            },
            state_path: state_path(config_path),
            lock_path: lock_path(config_path),
            resync,
        })
    }
}
