//! In-memory store for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::StoreConfig;
use crate::store::{
    KeyValue, StoreClient, StoreConnector, StoreError, StoreResult, StoreStatus, WatchCallback,
    WatchEvent, WatchId,
};

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Default)]
struct Document {
    value: Option<String>,
    modified_index: u64,
}

pub struct MockStore {
    doc: Mutex<Document>,
    index: watch::Sender<u64>,
    callbacks: Mutex<Vec<(WatchId, WatchCallback)>>,
    next_watch_id: AtomicU64,
    reachable: AtomicBool,
    healthy: AtomicBool,
    fail_polls: AtomicBool,
    clear_next_poll: AtomicBool,
    gets: AtomicUsize,
    cancelled: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        let (index, _) = watch::channel(0);
        Self {
            doc: Mutex::new(Document::default()),
            index,
            callbacks: Mutex::new(Vec::new()),
            next_watch_id: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            healthy: AtomicBool::new(true),
            fail_polls: AtomicBool::new(false),
            clear_next_poll: AtomicBool::new(false),
            gets: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    /// Replace the document without notifying callbacks.
    pub fn set_document(&self, value: &str) -> u64 {
        let index = *self.index.borrow() + 1;
        {
            let mut doc = self.doc.lock().unwrap();
            doc.value = Some(value.to_string());
            doc.modified_index = index;
        }
        self.index.send_replace(index);
        index
    }

    /// Replace the document and run every registered callback.
    pub async fn update_document(&self, value: &str) {
        let index = self.set_document(value);
        let callbacks: Vec<WatchCallback> = self
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(WatchEvent {
                modified_index: index,
            })
            .await;
        }
    }

    pub fn modified_index(&self) -> u64 {
        self.doc.lock().unwrap().modified_index
    }

    /// Unreachable: every call fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Unhealthy: only `status` fails.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_polls(&self, fail: bool) {
        self.fail_polls.store(fail, Ordering::SeqCst);
    }

    /// The next long-poll fails as if its history had been compacted.
    pub fn clear_next_poll(&self) {
        self.clear_next_poll.store(true, Ordering::SeqCst);
    }

    pub fn active_callbacks(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub fn cancelled_watches(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl StoreClient for MockStore {
    async fn get(&self, key: &str) -> StoreResult<KeyValue> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let doc = self.doc.lock().unwrap();
        let value = doc
            .value
            .clone()
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        Ok(KeyValue {
            value: value.into_bytes(),
            modified_index: doc.modified_index,
            store_index: *self.index.borrow(),
        })
    }

    async fn wait_for_change(&self, _key: &str, index: u64) -> StoreResult<Option<u64>> {
        self.check_reachable()?;
        if self.fail_polls.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            return Err(StoreError::Connection("watch stream reset".to_string()));
        }
        if self.clear_next_poll.swap(false, Ordering::SeqCst) {
            return Err(StoreError::IndexCleared {
                current_index: *self.index.borrow(),
            });
        }
        let mut rx = self.index.subscribe();
        let waited = tokio::time::timeout(POLL_TIMEOUT, async move {
            rx.wait_for(|current| *current >= index).await.map(|current| *current)
        })
        .await;
        match waited {
            Ok(Ok(current)) => Ok(Some(current)),
            Ok(Err(_)) => Err(StoreError::Connection("store closed".to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn add_watch_callback(&self, _key: &str, callback: WatchCallback) -> StoreResult<WatchId> {
        self.check_reachable()?;
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::SeqCst));
        self.callbacks.lock().unwrap().push((id, callback));
        Ok(id)
    }

    async fn cancel_watch(&self, id: WatchId) {
        self.callbacks.lock().unwrap().retain(|(w, _)| *w != id);
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.check_reachable()?;
        if self.healthy.load(Ordering::SeqCst) {
            Ok(StoreStatus {
                server_version: "mock".to_string(),
            })
        } else {
            Err(StoreError::Server {
                code: 503,
                message: "unhealthy".to_string(),
            })
        }
    }
}

/// Hands out the shared [`MockStore`] on every connect.
pub struct MockConnector {
    pub store: Arc<MockStore>,
    refuse: AtomicBool,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(store: Arc<MockStore>) -> Self {
        Self {
            store,
            refuse: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    async fn connect(&self, _config: &StoreConfig) -> StoreResult<Arc<dyn StoreClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        Ok(self.store.clone())
    }
}
