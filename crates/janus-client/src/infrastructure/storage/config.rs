//! TOML-based configuration for the snapshot client.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\JanusSnap\config.toml`
//! - Linux:    `~/.config/janus-snap/config.toml`
//! - macOS:    `~/Library/Application Support/JanusSnap/config.toml`
//!
//! A complete file looks like this:
//!
//! ```toml
//! [gateway]
//! host = "10.0.0.254"
//! port = 8188
//! secure = true
//! accept_invalid_certs = true   # self-signed gateway certificates
//!
//! [timeouts]
//! control_secs = 10
//! capture_secs = 15
//! connect_secs = 10
//! keepalive_secs = 25   # 0 disables keepalives
//!
//! [snapshots]
//! output_dir = "photos"
//! url_template = "http://{host}:{port}/snapshot"
//! backend_host = "10.0.0.254"
//! default_port = 8080
//!
//! [snapshots.ports]
//! 1 = 8080
//! 2 = 8081
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a missing file, a
//! missing section or a missing key all fall back to the defaults above.
//! Older files keep loading when newer keys are added.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use janus_core::domain::DEFAULT_GATEWAY_PORT;
use janus_core::{SessionConfig, SourceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::capture_backend::{
    DEFAULT_BACKEND_HOST, DEFAULT_BACKEND_PORT, DEFAULT_URL_TEMPLATE,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config value {key}: {reason}")]
    Invalid { key: String, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub snapshots: SnapshotSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Where the gateway lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Try `wss://` first.  A failed TLS open falls back to `ws://` once.
    #[serde(default = "default_true")]
    pub secure: bool,
    /// Accept any `wss://` certificate, as gateways with self-signed
    /// certificates need.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

/// Deadlines, in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    #[serde(default = "default_control_secs")]
    pub control_secs: u64,
    #[serde(default = "default_capture_secs")]
    pub capture_secs: u64,
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    /// `0` disables keepalives.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

/// Where image bytes come from and where they go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotSection {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// HTTP snapshot URL with `{host}`, `{port}` and `{id}` placeholders.
    #[serde(default = "default_url_template")]
    pub url_template: String,
    #[serde(default = "default_backend_host")]
    pub backend_host: String,
    #[serde(default = "default_backend_port")]
    pub default_port: u16,
    /// Per-source HTTP port, keyed by source id.  TOML keys are strings.
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_host() -> String {
    "10.0.0.254".to_string()
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_true() -> bool {
    true
}
fn default_control_secs() -> u64 {
    10
}
fn default_capture_secs() -> u64 {
    15
}
fn default_connect_secs() -> u64 {
    10
}
fn default_keepalive_secs() -> u64 {
    25
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("photos")
}
fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}
fn default_backend_host() -> String {
    DEFAULT_BACKEND_HOST.to_string()
}
fn default_backend_port() -> u16 {
    DEFAULT_BACKEND_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            secure: default_true(),
            accept_invalid_certs: default_true(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            control_secs: default_control_secs(),
            capture_secs: default_capture_secs(),
            connect_secs: default_connect_secs(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            url_template: default_url_template(),
            backend_host: default_backend_host(),
            default_port: default_backend_port(),
            ports: BTreeMap::new(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Session deadlines from the `[timeouts]` section.
    pub fn session_config(&self) -> SessionConfig {
        let t = &self.timeouts;
        SessionConfig {
            control_timeout: Duration::from_secs(t.control_secs),
            capture_timeout: Duration::from_secs(t.capture_secs),
            connect_timeout: Duration::from_secs(t.connect_secs),
            keepalive_interval: (t.keepalive_secs > 0)
                .then(|| Duration::from_secs(t.keepalive_secs)),
            ..SessionConfig::default()
        }
    }
}

impl SnapshotSection {
    /// The `[snapshots.ports]` table with its keys parsed as source ids.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for a key that is not a number.
    pub fn source_ports(&self) -> Result<BTreeMap<SourceId, u16>, ConfigError> {
        self.ports
            .iter()
            .map(|(key, port)| {
                key.parse::<SourceId>()
                    .map(|id| (id, *port))
                    .map_err(|e| ConfigError::Invalid {
                        key: format!("snapshots.ports.{key}"),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("JanusSnap"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("janus-snap"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("JanusSnap")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
