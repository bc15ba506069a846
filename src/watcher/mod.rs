//! Topology watcher: connection supervision and change subscriptions.
//!
//! # Data Flow
//! ```text
//! supervisor.rs
//!     connect → initial read → publisher.rs → output queue
//!     install subscription.rs (callback or poll)
//!         on change → publisher.rs → output queue
//!     health probe every interval
//!         on failure / watch broken → tear down, sleep, reconnect
//! ```

pub mod publisher;
pub mod state;
pub mod subscription;
pub mod supervisor;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{WatchMode, WatcherConfig};
use crate::store::StoreError;
use crate::topology::{RouteSpec, TopologyError};

pub use state::{StatusInfo, WatcherState};
pub use supervisor::TopologyWatcher;

/// Store key holding the topology document.
pub const TOPOLOGY_KEY: &str = "/romana/ipam/data";

/// A failed read + flatten of the topology document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// A change subscription could not be installed.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch install failed: {0}")]
    Install(#[source] StoreError),
}

/// Runtime timing of the supervisor.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub watch_mode: WatchMode,
    pub connect_check_interval: Duration,
    pub call_timeout: Duration,
    pub poll_retry_base: Duration,
    pub poll_retry_max: Duration,
}

impl WatcherSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            watch_mode: config.store.watch_mode,
            connect_check_interval: config.watch.connect_check_interval(),
            call_timeout: config.watch.call_timeout(),
            poll_retry_base: Duration::from_millis(config.watch.poll_retry_base_ms),
            poll_retry_max: Duration::from_millis(config.watch.poll_retry_max_ms),
        }
    }
}

/// The interface a host router-management process drives.
#[async_trait]
pub trait WatcherPlugin: Send + Sync {
    fn plugin_name(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Begin watching in the background.
    fn start(&self);

    /// Stop watching; returns once all background work has finished.
    async fn stop(&self);

    /// Receiving end of the route spec queue. Handed out once.
    fn output_queue(&self) -> Option<mpsc::UnboundedReceiver<RouteSpec>>;

    fn status_info(&self) -> StatusInfo;
}
