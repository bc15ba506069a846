//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the watcher.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the topology watcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Store connection settings.
    pub store: StoreConfig,

    /// Health check and watch timing.
    pub watch: WatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin status endpoint.
    pub admin: AdminConfig,
}

/// How changes to the topology key are observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// The store client invokes a callback on every change.
    #[default]
    Callback,
    /// A dedicated task long-polls the store from a tracked index.
    Poll,
}

impl std::fmt::Display for WatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchMode::Callback => write!(f, "callback"),
            WatchMode::Poll => write!(f, "poll"),
        }
    }
}

/// Store (etcd) connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Address of the store.
    pub addr: String,

    /// Port of the store (must satisfy 0 < port < 65535).
    pub port: u32,

    /// Change subscription strategy.
    pub watch_mode: WatchMode,

    /// PEM encoded CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// PEM encoded private key.
    pub priv_key: Option<PathBuf>,

    /// PEM encoded certificate chain.
    pub cert_chain: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: "localhost".to_string(),
            port: 2379,
            watch_mode: WatchMode::Callback,
            ca_cert: None,
            priv_key: None,
            cert_chain: None,
        }
    }
}

impl StoreConfig {
    /// All three TLS files, if all three are configured.
    pub fn tls_files(&self) -> Option<TlsFiles> {
        match (&self.ca_cert, &self.priv_key, &self.cert_chain) {
            (Some(ca_cert), Some(priv_key), Some(cert_chain)) => Some(TlsFiles {
                ca_cert: ca_cert.clone(),
                priv_key: priv_key.clone(),
                cert_chain: cert_chain.clone(),
            }),
            _ => None,
        }
    }
}

/// A complete set of TLS files for the store connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca_cert: PathBuf,
    pub priv_key: PathBuf,
    pub cert_chain: PathBuf,
}

/// Health check and watch timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Interval between connection health checks in seconds, e.g. `0.5`.
    pub connect_check_secs: f64,

    /// Timeout for every call to the store in seconds.
    pub call_timeout_secs: f64,

    /// Base delay before a failed long-poll is retried, in milliseconds.
    pub poll_retry_base_ms: u64,

    /// Maximum delay between long-poll retries, in milliseconds.
    pub poll_retry_max_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            connect_check_secs: 5.0,
            call_timeout_secs: 2.0,
            poll_retry_base_ms: 2000,
            poll_retry_max_ms: 30_000,
        }
    }
}

impl WatchConfig {
    /// Zero when the value is negative or not representable; validation
    /// rejects both.
    pub fn connect_check_interval(&self) -> Duration {
        secs_to_duration(self.connect_check_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        secs_to_duration(self.call_timeout_secs)
    }
}

pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin status endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin status endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8082".to_string(),
        }
    }
}
