//! Key-value store client contract.
//!
//! The supervisor only talks to the store through [`StoreConnector`] and
//! [`StoreClient`]; [`etcd`] provides the implementation used in
//! production.
//!
//! # Operations
//! ```text
//! get(key)                      → value bytes + indexes
//! wait_for_change(key, index)   → long-poll, None on call timeout
//! add_watch_callback(key, cb)   → WatchId, cb runs on every change
//! cancel_watch(id)
//! status()                      → server version, error when unhealthy
//! ```

pub mod etcd;
#[cfg(test)]
pub mod mock;
pub mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::StoreConfig;

pub use etcd::{EtcdClient, EtcdConnector};

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the request failed in transit.
    #[error("connection error: {0}")]
    Connection(String),

    /// A call did not complete within the call timeout.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The requested key does not exist.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The watch index has been compacted away.
    #[error("watch index cleared, store is at index {current_index}")]
    IndexCleared { current_index: u64 },

    /// The store answered with an error.
    #[error("store error {code}: {message}")]
    Server { code: i64, message: String },

    /// The store's response could not be decoded.
    #[error("cannot decode store response: {0}")]
    Decode(String),

    /// TLS material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A value read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub value: Vec<u8>,
    /// Index at which this key was last modified.
    pub modified_index: u64,
    /// Index of the store as a whole at the time of the read.
    pub store_index: u64,
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub server_version: String,
}

/// A change observed on a watched key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent {
    pub modified_index: u64,
}

/// Identifier of a registered watch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Callback invoked for every change on a watched key.
pub type WatchCallback = Arc<dyn Fn(WatchEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// A connection to the store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Read a key.
    async fn get(&self, key: &str) -> StoreResult<KeyValue>;

    /// Block until `key` changes at or after `index`.
    ///
    /// Returns the modification index of the change, or `None` when the call
    /// timeout elapsed first.
    async fn wait_for_change(&self, key: &str, index: u64) -> StoreResult<Option<u64>>;

    /// Register a callback for changes on `key`.
    async fn add_watch_callback(&self, key: &str, callback: WatchCallback) -> StoreResult<WatchId>;

    /// Remove a callback registered with `add_watch_callback`.
    async fn cancel_watch(&self, id: WatchId);

    /// Lightweight health probe.
    async fn status(&self) -> StoreResult<StoreStatus>;
}

/// Opens connections to the store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<Arc<dyn StoreClient>>;
}
