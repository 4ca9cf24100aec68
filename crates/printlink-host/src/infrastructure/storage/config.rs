//! TOML-based configuration persistence for the host.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\PrintLink\config.toml`
//! - Linux:    `~/.config/printlink/config.toml`
//! - macOS:    `~/Library/Application Support/PrintLink/config.toml`
//!
//! Binaries may point at another file with `--config`; see
//! [`load_config_from`].
//!
//! # Example
//!
//! ```toml
//! [host]
//! log_level = "debug"
//!
//! [discovery]
//! bluetooth_secs = 20
//! on_provider_error = "keep_partial"
//!
//! [connection]
//! open_timeout_secs = 5
//!
//! [identity]
//! brand_tokens = ["zebra", "zq", "zt", "zd", "acme"]
//! ```
//!
//! # Serde default values
//!
//! Every section and every field has a default, so an empty file, a missing
//! file, and a file written by an older version all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use printlink_core::domain::scan;
use printlink_core::{AddressMatch, PrinterIdentity, DEFAULT_BRAND_TOKENS, DEFAULT_NETWORK_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::connect::ConnectionSettings;
use crate::application::discover::{DiscoverySettings, ProviderErrorPolicy, ScanTimeouts};
use crate::infrastructure::worker_pool::DEFAULT_MAX_CONCURRENT;

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
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Per-kind scan timeouts in seconds, plus the provider-error policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "default_local_broadcast_secs")]
    pub local_broadcast_secs: u64,
    #[serde(default = "default_network_auto_secs")]
    pub network_auto_secs: u64,
    #[serde(default = "default_multicast_secs")]
    pub multicast_secs: u64,
    #[serde(default = "default_subnet_secs")]
    pub subnet_secs: u64,
    #[serde(default = "default_bluetooth_secs")]
    pub bluetooth_secs: u64,
    #[serde(default = "default_ble_radio_secs")]
    pub ble_radio_secs: u64,
    #[serde(default = "default_usb_secs")]
    pub usb_secs: u64,
    /// `"fail"` discards partial results on a provider error;
    /// `"keep_partial"` returns them.
    #[serde(default)]
    pub on_provider_error: ProviderErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_port")]
    pub default_port: u16,
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    #[serde(default = "default_usb_resolve_timeout_secs")]
    pub usb_resolve_timeout_secs: u64,
    #[serde(default = "default_usb_permission_timeout_secs")]
    pub usb_permission_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkersConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    /// Lower-case substrings that mark a Bluetooth name as a printer.
    #[serde(default = "default_brand_tokens")]
    pub brand_tokens: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_local_broadcast_secs() -> u64 {
    scan::LOCAL_BROADCAST_TIMEOUT.as_secs()
}
fn default_network_auto_secs() -> u64 {
    scan::NETWORK_AUTO_TIMEOUT.as_secs()
}
fn default_multicast_secs() -> u64 {
    scan::MULTICAST_TIMEOUT.as_secs()
}
fn default_subnet_secs() -> u64 {
    scan::SUBNET_TIMEOUT.as_secs()
}
fn default_bluetooth_secs() -> u64 {
    scan::BLUETOOTH_TIMEOUT.as_secs()
}
fn default_ble_radio_secs() -> u64 {
    scan::BLE_RADIO_TIMEOUT.as_secs()
}
fn default_usb_secs() -> u64 {
    scan::USB_TIMEOUT.as_secs()
}
fn default_port() -> u16 {
    DEFAULT_NETWORK_PORT
}
fn default_open_timeout_secs() -> u64 {
    10
}
fn default_usb_resolve_timeout_secs() -> u64 {
    5
}
fn default_usb_permission_timeout_secs() -> u64 {
    60
}
fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}
fn default_brand_tokens() -> Vec<String> {
    DEFAULT_BRAND_TOKENS.iter().map(|t| t.to_string()).collect()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            local_broadcast_secs: default_local_broadcast_secs(),
            network_auto_secs: default_network_auto_secs(),
            multicast_secs: default_multicast_secs(),
            subnet_secs: default_subnet_secs(),
            bluetooth_secs: default_bluetooth_secs(),
            ble_radio_secs: default_ble_radio_secs(),
            usb_secs: default_usb_secs(),
            on_provider_error: ProviderErrorPolicy::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            open_timeout_secs: default_open_timeout_secs(),
            usb_resolve_timeout_secs: default_usb_resolve_timeout_secs(),
            usb_permission_timeout_secs: default_usb_permission_timeout_secs(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            brand_tokens: default_brand_tokens(),
        }
    }
}

// ── Conversion into application settings ──────────────────────────────────────

impl DiscoveryConfig {
    pub fn to_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            timeouts: ScanTimeouts {
                local_broadcast: Duration::from_secs(self.local_broadcast_secs),
                network_auto: Duration::from_secs(self.network_auto_secs),
                multicast: Duration::from_secs(self.multicast_secs),
                subnet: Duration::from_secs(self.subnet_secs),
                bluetooth: Duration::from_secs(self.bluetooth_secs),
                ble_radio: Duration::from_secs(self.ble_radio_secs),
                usb: Duration::from_secs(self.usb_secs),
            },
            on_provider_error: self.on_provider_error,
            address_match: AddressMatch::Exact,
        }
    }
}

impl ConnectionConfig {
    pub fn to_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            default_port: self.default_port,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            usb_resolve_timeout: Duration::from_secs(self.usb_resolve_timeout_secs),
            usb_permission_timeout: Duration::from_secs(self.usb_permission_timeout_secs),
        }
    }
}

impl IdentityConfig {
    pub fn to_identity(&self) -> PrinterIdentity {
        PrinterIdentity::new(self.brand_tokens.iter().cloned())
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

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default location, returning defaults if the
/// file does not exist yet.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config directory including the `PrintLink` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PrintLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("printlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PrintLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_timeouts_match_scan_kind_defaults() {
        // Arrange / Act
        let settings = AppConfig::default().discovery.to_settings();

        // Assert
        assert_eq!(settings.timeouts, ScanTimeouts::default());
        assert_eq!(settings.timeouts.bluetooth, Duration::from_secs(30));
        assert_eq!(settings.on_provider_error, ProviderErrorPolicy::Fail);
    }

    #[test]
    fn test_default_connection_settings() {
        let settings = ConnectionConfig::default().to_settings();
        assert_eq!(settings, ConnectionSettings::default());
    }

    #[test]
    fn test_default_identity_uses_brand_tokens() {
        let identity = IdentityConfig::default().to_identity();
        assert!(identity.matches_brand("Zebra ZD421"));
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_sections_override_only_named_fields() {
        // Arrange
        let toml_str = r#"
[discovery]
bluetooth_secs = 12
on_provider_error = "keep_partial"

[workers]
max_concurrent = 8
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.discovery.bluetooth_secs, 12);
        assert_eq!(cfg.discovery.usb_secs, 10);
        assert_eq!(cfg.discovery.on_provider_error, ProviderErrorPolicy::KeepPartial);
        assert_eq!(cfg.workers.max_concurrent, 8);
        assert_eq!(cfg.connection.default_port, 9100);
    }

    #[test]
    fn test_unknown_policy_is_a_parse_error() {
        let result: Result<AppConfig, _> = toml::from_str("[discovery]\non_provider_error = \"ignore\"");
        assert!(result.is_err());
    }

    // ── File round trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_default() {
        let path = std::env::temp_dir()
            .join(format!("printlink_missing_{}", Uuid::new_v4()))
            .join("config.toml");

        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_config_from_file_applies_values() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("printlink_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[connection]\nopen_timeout_secs = 3\n\n[identity]\nbrand_tokens = [\"acme\"]\n",
        )
        .unwrap();
        let mut expected = AppConfig::default();
        expected.connection.open_timeout_secs = 3;
        expected.identity.brand_tokens = vec!["acme".to_string()];

        // Act
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, expected);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("printlink_bad_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let err = load_config_from(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
