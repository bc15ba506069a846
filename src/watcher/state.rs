//! Watcher state shared between the supervisor and its observers.
//!
//! # States
//! ```text
//! Disconnected → Connecting → Watching → Disconnected → ...
//! any state    → Stopped (terminal, after stop())
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::{StoreConfig, WatchMode};
use crate::observability::metrics;

/// Lifecycle state of the supervisor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Disconnected = 0,
    Connecting = 1,
    Watching = 2,
    Stopped = 3,
}

impl From<u8> for WatcherState {
    fn from(val: u8) -> Self {
        match val {
            1 => WatcherState::Connecting,
            2 => WatcherState::Watching,
            3 => WatcherState::Stopped,
            _ => WatcherState::Disconnected,
        }
    }
}

/// Flags shared between the supervisor and the watch path.
///
/// `running` is cleared by `stop()`. `watch_broken` is raised by a
/// subscription that can no longer deliver changes and cleared at the start
/// of every cycle. Both are observed at loop-iteration granularity.
#[derive(Debug)]
pub struct WatchFlags {
    running: AtomicBool,
    watch_broken: AtomicBool,
}

impl Default for WatchFlags {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(true),
            watch_broken: AtomicBool::new(false),
        }
    }
}

impl WatchFlags {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_broken(&self) -> bool {
        self.watch_broken.load(Ordering::SeqCst)
    }

    pub fn mark_broken(&self) {
        self.watch_broken.store(true, Ordering::SeqCst);
    }

    pub fn clear_broken(&self) {
        self.watch_broken.store(false, Ordering::SeqCst);
    }
}

/// The last document read from the store.
#[derive(Debug, Clone, Serialize)]
pub struct RawTopology {
    pub time: DateTime<Utc>,
    pub data: Value,
}

/// Counters and timestamps updated by the supervisor and the publisher.
#[derive(Debug)]
pub struct WatcherStats {
    state: AtomicU8,
    connect_time: ArcSwapOption<DateTime<Utc>>,
    latest_raw: ArcSwapOption<RawTopology>,
    route_specs_published: AtomicU64,
    load_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl Default for WatcherStats {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(WatcherState::Disconnected as u8),
            connect_time: ArcSwapOption::empty(),
            latest_raw: ArcSwapOption::empty(),
            route_specs_published: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }
}

impl WatcherStats {
    pub fn state(&self) -> WatcherState {
        WatcherState::from(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: WatcherState) {
        self.state.store(state as u8, Ordering::Release);
        metrics::record_state(state);
    }

    pub fn mark_connected(&self) {
        self.connect_time.store(Some(Utc::now().into()));
    }

    pub fn record_raw(&self, data: Value) {
        self.latest_raw.store(Some(
            RawTopology {
                time: Utc::now(),
                data,
            }
            .into(),
        ));
    }

    pub fn record_published(&self, routes: usize) {
        self.route_specs_published.fetch_add(1, Ordering::Relaxed);
        metrics::record_route_spec_published(routes);
    }

    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_load_failure();
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::record_reconnect();
    }

    pub fn route_specs_published(&self) -> u64 {
        self.route_specs_published.load(Ordering::Relaxed)
    }

    pub fn load_failures(&self) -> u64 {
        self.load_failures.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }
}

/// Read-only status snapshot for external observability.
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub plugin: &'static str,
    pub version: &'static str,
    pub params: StoreParams,
    pub state: WatcherState,
    pub raw_topology: Option<RawTopology>,
    pub stats: StatsInfo,
}

/// Connection parameters. TLS files are named, never read.
#[derive(Debug, Clone, Serialize)]
pub struct StoreParams {
    pub addr: String,
    pub port: u32,
    pub watch_mode: WatchMode,
    pub ca_cert: Option<String>,
    pub priv_key: Option<String>,
    pub cert_chain: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsInfo {
    pub connect_time: Option<DateTime<Utc>>,
    pub route_specs_published: u64,
    pub load_failures: u64,
    pub reconnects: u64,
}

impl StoreParams {
    pub fn from_config(config: &StoreConfig) -> Self {
        let path = |p: &Option<std::path::PathBuf>| p.as_deref().map(Path::display).map(|d| d.to_string());
        Self {
            addr: config.addr.clone(),
            port: config.port,
            watch_mode: config.watch_mode,
            ca_cert: path(&config.ca_cert),
            priv_key: path(&config.priv_key),
            cert_chain: path(&config.cert_chain),
        }
    }
}

impl WatcherStats {
    /// Build a snapshot.
    pub fn snapshot(
        &self,
        plugin: &'static str,
        version: &'static str,
        params: StoreParams,
    ) -> StatusInfo {
        StatusInfo {
            plugin,
            version,
            params,
            state: self.state(),
            raw_topology: self.latest_raw.load_full().map(|raw| (*raw).clone()),
            stats: StatsInfo {
                connect_time: self.connect_time.load_full().map(|t| *t),
                route_specs_published: self.route_specs_published(),
                load_failures: self.load_failures.load(Ordering::Relaxed),
                reconnects: self.reconnects(),
            },
        }
    }
}
