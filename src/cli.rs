//! Command line overrides for the store connection.

use std::path::PathBuf;

use clap::Args;

use crate::config::{WatchMode, WatcherConfig};

/// Store flags accepted by the watcher binary. Each one overrides the
/// corresponding config file value.
#[derive(Debug, Clone, Default, Args)]
pub struct WatcherArgs {
    /// Store address
    #[arg(long = "etcd-addr", value_name = "ADDR")]
    pub addr: Option<String>,

    /// Store port
    #[arg(long = "etcd-port", value_name = "PORT")]
    pub port: Option<u32>,

    /// Long-poll the store instead of using watch callbacks
    #[arg(long = "etcd-use-v2")]
    pub use_v2: bool,

    /// PEM encoded CA certificate
    #[arg(long = "etcd-ca-cert", value_name = "FILE")]
    pub ca_cert: Option<PathBuf>,

    /// PEM encoded private key
    #[arg(long = "etcd-priv-key", value_name = "FILE")]
    pub priv_key: Option<PathBuf>,

    /// PEM encoded certificate chain
    #[arg(long = "etcd-cert-chain", value_name = "FILE")]
    pub cert_chain: Option<PathBuf>,

    /// Seconds between store health checks, fractions allowed
    #[arg(long, value_name = "SECS")]
    pub connect_check_secs: Option<f64>,

    /// Timeout for store calls in seconds, fractions allowed
    #[arg(long, value_name = "SECS")]
    pub call_timeout_secs: Option<f64>,
}

impl WatcherArgs {
    pub fn apply(&self, config: &mut WatcherConfig) {
        if let Some(addr) = &self.addr {
            config.store.addr = addr.clone();
        }
        if let Some(port) = self.port {
            config.store.port = port;
        }
        if self.use_v2 {
            config.store.watch_mode = WatchMode::Poll;
        }
        if let Some(path) = &self.ca_cert {
            config.store.ca_cert = Some(path.clone());
        }
        if let Some(path) = &self.priv_key {
            config.store.priv_key = Some(path.clone());
        }
        if let Some(path) = &self.cert_chain {
            config.store.cert_chain = Some(path.clone());
        }
        if let Some(secs) = self.connect_check_secs {
            config.watch.connect_check_secs = secs;
        }
        if let Some(secs) = self.call_timeout_secs {
            config.watch.call_timeout_secs = secs;
        }
    }
}
