//! Connection supervisor.
//!
//! # Responsibilities
//! - Own the store client and the active subscription for one cycle
//! - Publish the current document on every (re)connect
//! - Probe store health and restart the cycle on any fault
//! - Start/stop lifecycle and status snapshots

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::loader::check_config;
use crate::config::validation::validate_store_config;
use crate::config::{ConfigError, StoreConfig, ValidationError, WatcherConfig};
use crate::lifecycle::{Shutdown, ShutdownListener};
use crate::resilience::timeouts::with_timeout;
use crate::store::{StoreClient, StoreConnector};
use crate::topology::RouteSpec;
use crate::watcher::publisher::TopologyPublisher;
use crate::watcher::state::{StoreParams, WatchFlags, WatcherStats};
use crate::watcher::subscription::{subscription_for, ChangeSubscription, SubscriptionContext};
use crate::watcher::{StatusInfo, WatcherPlugin, WatcherSettings, WatcherState, TOPOLOGY_KEY};

/// Name reported in status snapshots.
pub const PLUGIN_NAME: &str = "topology_watcher.etcd";

/// Watches the topology document and publishes a route spec per change.
pub struct TopologyWatcher {
    store: StoreConfig,
    settings: WatcherSettings,
    connector: Arc<dyn StoreConnector>,
    stats: Arc<WatcherStats>,
    flags: Arc<WatchFlags>,
    publisher: Arc<TopologyPublisher>,
    output: Mutex<Option<mpsc::UnboundedReceiver<RouteSpec>>>,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl TopologyWatcher {
    /// Create a watcher from a full configuration. Fails on invalid config.
    pub fn new(
        config: &WatcherConfig,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self, ConfigError> {
        check_config(config)?;
        Ok(Self::build(
            config.store.clone(),
            WatcherSettings::from_config(config),
            connector,
        ))
    }

    /// Create a watcher with explicit timing, e.g. sub-second intervals.
    pub fn with_settings(
        store: StoreConfig,
        settings: WatcherSettings,
        connector: Arc<dyn StoreConnector>,
    ) -> Result<Self, ConfigError> {
        let mut errors = validate_store_config(&store).err().unwrap_or_default();
        if settings.connect_check_interval.is_zero() {
            errors.push(ValidationError::ZeroValue("connect_check_secs"));
        }
        if settings.call_timeout.is_zero() {
            errors.push(ValidationError::ZeroValue("call_timeout_secs"));
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self::build(store, settings, connector))
    }

    fn build(
        store: StoreConfig,
        settings: WatcherSettings,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WatcherStats::default());
        let publisher = TopologyPublisher::new(tx, stats.clone(), settings.call_timeout);
        Self {
            store,
            settings,
            connector,
            stats,
            flags: Arc::new(WatchFlags::default()),
            publisher: Arc::new(publisher),
            output: Mutex::new(Some(rx)),
            shutdown: Shutdown::new(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> WatcherState {
        self.stats.state()
    }
}

#[async_trait]
impl WatcherPlugin for TopologyWatcher {
    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Topology watcher already started, ignoring start request");
            return;
        }
        tracing::info!("Starting to watch for topology updates...");

        let supervisor = Supervisor {
            store: self.store.clone(),
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            stats: self.stats.clone(),
            flags: self.flags.clone(),
            publisher: self.publisher.clone(),
            subscription: subscription_for(self.settings.watch_mode),
        };
        let handle = tokio::spawn(supervisor.run(self.shutdown.subscribe()).in_current_span());
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn stop(&self) {
        tracing::debug!("Sending stop signal to store watcher task");
        self.flags.stop_running();
        self.shutdown.trigger();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Store watcher task failed");
            }
        }

        self.stats.set_state(WatcherState::Stopped);
        tracing::info!("Stopped");
    }

    fn output_queue(&self) -> Option<mpsc::UnboundedReceiver<RouteSpec>> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn status_info(&self) -> StatusInfo {
        self.stats.snapshot(
            PLUGIN_NAME,
            self.version(),
            StoreParams::from_config(&self.store),
        )
    }
}

/// State owned by the background task.
struct Supervisor {
    store: StoreConfig,
    settings: WatcherSettings,
    connector: Arc<dyn StoreConnector>,
    stats: Arc<WatcherStats>,
    flags: Arc<WatchFlags>,
    publisher: Arc<TopologyPublisher>,
    subscription: Box<dyn ChangeSubscription>,
}

impl Supervisor {
    async fn run(self, mut shutdown: ShutdownListener) {
        while self.is_running(&shutdown) {
            self.run_cycle(&mut shutdown).await;

            if !self.is_running(&shutdown) {
                break;
            }
            tracing::warn!("Lost store connection");
            self.stats.record_reconnect();
            if shutdown.sleep(self.settings.connect_check_interval).await {
                break;
            }
        }
    }

    fn is_running(&self, shutdown: &ShutdownListener) -> bool {
        self.flags.is_running() && !shutdown.is_triggered()
    }

    async fn run_cycle(&self, shutdown: &mut ShutdownListener) {
        self.flags.clear_broken();
        self.stats.set_state(WatcherState::Connecting);

        tracing::debug!("Attempting to connect to store");
        let mut client = match with_timeout(
            self.settings.call_timeout,
            self.connector.connect(&self.store),
        )
        .await
        {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::error!("Cannot establish connection to store: {}", e);
                None
            }
        };

        let mut watch = None;
        if let Some(connected) = client.clone() {
            self.stats.mark_connected();
            tracing::debug!("Initial data read");
            self.publisher.load_and_publish(connected.as_ref()).await;

            tracing::debug!("Attempting to establish watch on '{}'", TOPOLOGY_KEY);
            let ctx = SubscriptionContext {
                client: connected,
                publisher: self.publisher.clone(),
                flags: self.flags.clone(),
                settings: self.settings.clone(),
            };
            match self.subscription.install(ctx).await {
                Ok(active) => {
                    watch = Some(active);
                    self.stats.set_state(WatcherState::Watching);
                    tracing::info!("Established store connection and watch for topology data");
                }
                Err(e) => {
                    tracing::error!("Cannot establish connection to store: {}", e);
                    client = None;
                }
            }
        }

        while self.flags.is_running()
            && !self.flags.is_broken()
            && self.check_status(client.as_deref()).await
        {
            if shutdown.sleep(self.settings.connect_check_interval).await {
                break;
            }
        }

        if let Some(watch) = watch {
            watch.cancel().await;
        }
        drop(client);
        self.stats.set_state(WatcherState::Disconnected);
    }

    async fn check_status(&self, client: Option<&dyn StoreClient>) -> bool {
        let Some(client) = client else {
            tracing::debug!("Cannot get status from store, no connection");
            return false;
        };
        match with_timeout(self.settings.call_timeout, client.status()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Cannot get status from store: {}", e);
                false
            }
        }
    }
}
