//! Read + flatten + enqueue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::resilience::timeouts::with_timeout;
use crate::store::{KeyValue, StoreClient, StoreError};
use crate::topology::{parse_and_flatten, RouteSpec};
use crate::watcher::state::WatcherStats;
use crate::watcher::{LoadError, TOPOLOGY_KEY};

/// Publishes route specs built from the topology document.
///
/// Store reads that publish hold `reads` from the read until the spec is
/// enqueued, so specs are enqueued in the order their reads completed.
pub struct TopologyPublisher {
    tx: mpsc::UnboundedSender<RouteSpec>,
    stats: Arc<WatcherStats>,
    call_timeout: Duration,
    reads: Mutex<()>,
    last_seen_index: AtomicU64,
}

impl TopologyPublisher {
    pub fn new(
        tx: mpsc::UnboundedSender<RouteSpec>,
        stats: Arc<WatcherStats>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            stats,
            call_timeout,
            reads: Mutex::new(()),
            last_seen_index: AtomicU64::new(0),
        }
    }

    /// Modification index of the last document handed to the publisher,
    /// whether or not it produced a route spec.
    pub fn last_seen_index(&self) -> u64 {
        self.last_seen_index.load(Ordering::Acquire)
    }

    /// Read the topology key and publish the resulting route spec.
    ///
    /// Failures are logged and leave the previously published spec in place.
    pub async fn load_and_publish(&self, client: &dyn StoreClient) -> bool {
        let _reads = self.reads.lock().await;
        let result = match with_timeout(self.call_timeout, client.get(TOPOLOGY_KEY)).await {
            Ok(kv) => self.publish(&kv),
            Err(e) => Err(LoadError::Store(e)),
        };
        self.finish(result)
    }

    /// Publish a value that was already read.
    pub fn publish_value(&self, kv: &KeyValue) -> bool {
        let result = self.publish(kv);
        self.finish(result)
    }

    /// Publish `kv` unless its version was already seen.
    pub fn publish_if_unseen(&self, kv: &KeyValue) -> bool {
        if kv.modified_index == self.last_seen_index() {
            return false;
        }
        self.publish_value(kv)
    }

    /// Reread the topology key and publish it if it changed since the last
    /// document seen. A failed read is returned, not logged.
    pub async fn catch_up(&self, client: &dyn StoreClient) -> Result<bool, StoreError> {
        let _reads = self.reads.lock().await;
        let kv = with_timeout(self.call_timeout, client.get(TOPOLOGY_KEY)).await?;
        Ok(self.publish_if_unseen(&kv))
    }

    fn publish(&self, kv: &KeyValue) -> Result<(), LoadError> {
        self.last_seen_index
            .store(kv.modified_index, Ordering::Release);
        let (doc, route_spec) = match parse_and_flatten(&kv.value) {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Ok(doc) = serde_json::from_slice(&kv.value) {
                    self.stats.record_raw(doc);
                }
                return Err(e.into());
            }
        };
        self.stats.record_raw(doc);

        tracing::debug!(
            "Sending route spec for routes: {:?}",
            route_spec.keys().collect::<Vec<_>>()
        );
        let routes = route_spec.len();
        if self.tx.send(route_spec).is_err() {
            tracing::debug!("Route spec queue has no consumer, dropping update");
        }
        self.stats.record_published(routes);
        Ok(())
    }

    fn finish(&self, result: Result<(), LoadError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Cannot load topology data at '{}': {}", TOPOLOGY_KEY, e);
                self.stats.record_load_failure();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;
    use tracing_test::traced_test;

    fn publisher() -> (TopologyPublisher, mpsc::UnboundedReceiver<RouteSpec>, Arc<WatcherStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WatcherStats::default());
        (
            TopologyPublisher::new(tx, stats.clone(), Duration::from_secs(1)),
            rx,
            stats,
        )
    }

    #[tokio::test]
    async fn test_publishes_flattened_spec() {
        let (publisher, mut rx, stats) = publisher();
        let store = MockStore::new();
        store.set_document(
            r#"{"networks":{"net1":{"host_groups":{"cidr":"10.0.0.0/8","hosts":[{"ip":"192.168.99.10"}]}}}}"#,
        );

        assert!(publisher.load_and_publish(&store).await);
        let spec = rx.try_recv().unwrap();
        assert_eq!(spec["10.0.0.0/8"], vec!["192.168.99.10"]);
        assert_eq!(stats.route_specs_published(), 1);
        assert_eq!(publisher.last_seen_index(), store.modified_index());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_bad_document_is_not_published() {
        let (publisher, mut rx, stats) = publisher();
        let store = MockStore::new();
        store.set_document(r#"{"topology": {}}"#);

        assert!(!publisher.load_and_publish(&store).await);
        assert!(rx.try_recv().is_err());
        assert!(logs_contain(
            "Cannot load topology data at '/romana/ipam/data': topology document has no 'networks' mapping"
        ));

        // The raw document is still recorded for inspection.
        let info = stats.snapshot("p", "v", crate::watcher::state::StoreParams::from_config(&Default::default()));
        assert_eq!(info.raw_topology.unwrap().data, serde_json::json!({"topology": {}}));
        assert_eq!(info.stats.load_failures, 1);
    }

    #[tokio::test]
    async fn test_bad_document_is_seen_once() {
        let (publisher, mut rx, stats) = publisher();
        let store = MockStore::new();
        let bad = store.set_document(r#"{"networks": "#);

        assert!(!publisher.load_and_publish(&store).await);
        assert_eq!(publisher.last_seen_index(), bad);

        // The same version again is skipped, not counted as a second failure.
        assert!(!publisher.catch_up(&store).await.unwrap());
        assert_eq!(stats.load_failures(), 1);

        store.set_document(r#"{"networks":{}}"#);
        assert!(publisher.catch_up(&store).await.unwrap());
        assert!(rx.try_recv().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catch_up_returns_read_errors() {
        let (publisher, _rx, stats) = publisher();
        let store = MockStore::new();
        store.set_reachable(false);

        let err = publisher.catch_up(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)), "{err}");
        assert_eq!(stats.load_failures(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_store_error_is_logged() {
        let (publisher, mut rx, _) = publisher();
        let store = MockStore::new();

        assert!(!publisher.load_and_publish(&store).await);
        assert!(rx.try_recv().is_err());
        assert!(logs_contain(
            "Cannot load topology data at '/romana/ipam/data': key not found: /romana/ipam/data"
        ));
    }
}
