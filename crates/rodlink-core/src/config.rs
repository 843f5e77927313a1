//! TOML configuration shared by the three boxes.
//!
//! Every field has a serde default so a partial file (or none at all) still
//! produces a working configuration, and a config written by an older
//! version keeps loading after new fields are added.  Example:
//!
//! ```toml
//! [network]
//! stream_port = 65432
//! control_port = 65433
//!
//! [auth]
//! approved_users = ["Jane Operator"]
//! rfid_validity_secs = 900
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
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
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub network: NetworkConfig,
    pub tls: TlsConfig,
    pub auth: AuthConfig,
    pub refresh: RefreshConfig,
}

/// General service behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    pub log_level: String,
}

/// Ports and addresses for the two relay listeners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for binary telemetry frames.
    pub stream_port: u16,
    /// TCP port for the JSON control channel.
    pub control_port: u16,
    /// Address the relay binds both listeners to.
    pub bind_address: String,
    /// Address client boxes connect to (the control box).
    pub control_host: String,
}

/// Optional mutual-TLS material.  All paths are relative to `cert_dir`
/// unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_dir: PathBuf,
    /// CA bundle every peer is verified against.
    pub ca_file: PathBuf,
    /// This box's certificate and key (`server.crt` on the control box,
    /// `instbox.crt` / `visbox.crt` on the clients).
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Authorization sequence parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// When false, the authorization machine is not started and display
    /// clients are admitted unconditionally.  For bench use without the
    /// camera and RFID reader attached.
    pub enabled: bool,
    /// Operators accepted by the face scan step.
    pub approved_users: Vec<String>,
    /// How long an RFID authorization lasts before re-auth is required.
    pub rfid_validity_secs: u64,
    /// Attempts granted inside the re-auth window before revocation.
    pub reauth_attempts: u32,
    /// Delay between face scan polls.
    pub face_poll_secs: u64,
    /// Delay between RFID read attempts.
    pub rfid_retry_secs: u64,
}

/// Refresh intervals for the hardware loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    pub leds_secs: u64,
    pub display_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            stream_port: 65432,
            control_port: 65433,
            bind_address: "0.0.0.0".to_string(),
            control_host: "127.0.0.1".to_string(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_dir: PathBuf::from("etc/certs"),
            ca_file: PathBuf::from("ca-chain.crt"),
            cert_file: PathBuf::from("server.crt"),
            key_file: PathBuf::from("server.key"),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            approved_users: Vec::new(),
            rfid_validity_secs: 15 * 60,
            reauth_attempts: 5,
            face_poll_secs: 2,
            rfid_retry_secs: 2,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            leds_secs: 1,
            display_secs: 1,
        }
    }
}

impl TlsConfig {
    /// Resolves a configured path against `cert_dir`.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.cert_dir.join(file)
        }
    }

    pub fn ca_path(&self) -> PathBuf {
        self.resolve(&self.ca_file)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.resolve(&self.cert_file)
    }

    pub fn key_path(&self) -> PathBuf {
        self.resolve(&self.key_file)
    }
}

impl AuthConfig {
    pub fn rfid_validity(&self) -> Duration {
        Duration::from_secs(self.rfid_validity_secs)
    }

    pub fn face_poll(&self) -> Duration {
        Duration::from_secs(self.face_poll_secs)
    }

    pub fn rfid_retry(&self) -> Duration {
        Duration::from_secs(self.rfid_retry_secs)
    }
}

impl RefreshConfig {
    pub fn leds(&self) -> Duration {
        Duration::from_secs(self.leds_secs)
    }

    pub fn display(&self) -> Duration {
        Duration::from_secs(self.display_secs)
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Loads configuration from `path`, or returns `AppConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than
/// "not found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
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

// ── Tests ─────────────────────────────────────────────────────────────────────
