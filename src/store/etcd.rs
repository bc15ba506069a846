//! etcd client speaking the v2 keys API over HTTP.
//!
//! # Responsibilities
//! - Read a key together with the store index (`X-Etcd-Index`)
//! - Long-poll a key for changes (`?wait=true&waitIndex=N`)
//! - Run callback watches as background tasks
//! - Probe health through `/version`
//! - Optional mutual TLS from the configured PEM files

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::Instrument;
use url::Url;

use crate::config::StoreConfig;
use crate::resilience::backoff::calculate_backoff;
use crate::store::tls::load_tls_material;
use crate::store::{
    KeyValue, StoreClient, StoreConnector, StoreError, StoreResult, StoreStatus, WatchCallback,
    WatchEvent, WatchId,
};

const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";
const ERROR_KEY_NOT_FOUND: i64 = 100;
const ERROR_EVENT_INDEX_CLEARED: i64 = 401;

/// Opens [`EtcdClient`] connections.
#[derive(Debug, Clone)]
pub struct EtcdConnector {
    call_timeout: Duration,
    retry_base: Duration,
    retry_max: Duration,
}

impl EtcdConnector {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            retry_base: Duration::from_secs(2),
            retry_max: Duration::from_secs(30),
        }
    }

    /// Delays used by callback watches after a failed long-poll.
    pub fn with_retry(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base = base;
        self.retry_max = max;
        self
    }
}

#[async_trait]
impl StoreConnector for EtcdConnector {
    async fn connect(&self, config: &StoreConfig) -> StoreResult<Arc<dyn StoreClient>> {
        let client = EtcdClient::new(config, self.call_timeout)?
            .with_retry(self.retry_base, self.retry_max);
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Deserialize)]
struct KeysResponse {
    node: Option<Node>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Node {
    value: Option<String>,
    #[serde(default)]
    modified_index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: i64,
    message: String,
    #[serde(default)]
    index: u64,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    etcdserver: String,
}

/// The HTTP half of the client, cheap to clone into watch tasks.
#[derive(Debug, Clone)]
struct EtcdHttp {
    http: reqwest::Client,
    base_url: Url,
    call_timeout: Duration,
}

impl EtcdHttp {
    fn key_url(&self, key: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/v2/keys/{}", key.trim_start_matches('/')));
        url
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.call_timeout)
        } else {
            StoreError::Connection(e.to_string())
        }
    }

    async fn get(&self, key: &str) -> StoreResult<KeyValue> {
        let response = self
            .http
            .get(self.key_url(key))
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let store_index = response
            .headers()
            .get(ETCD_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let node = self.read_node(key, response).await?;
        let value = node
            .value
            .ok_or_else(|| StoreError::Decode(format!("'{}' has no value", key)))?;

        Ok(KeyValue {
            value: value.into_bytes(),
            modified_index: node.modified_index,
            store_index: store_index.unwrap_or(node.modified_index),
        })
    }

    async fn wait_for_change(&self, key: &str, index: u64) -> StoreResult<Option<u64>> {
        let mut url = self.key_url(key);
        url.query_pairs_mut()
            .append_pair("wait", "true")
            .append_pair("waitIndex", &index.to_string());

        let response = match self.http.get(url).timeout(self.call_timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(self.transport_error(e)),
        };

        match self.read_node(key, response).await {
            Ok(node) => Ok(Some(node.modified_index)),
            Err(StoreError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        let mut url = self.base_url.clone();
        url.set_path("/version");

        let response = self
            .http
            .get(url)
            .timeout(self.call_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Server {
                code: i64::from(status.as_u16()),
                message: format!("status check returned {}", status),
            });
        }
        let version: VersionResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(StoreStatus {
            server_version: version.etcdserver,
        })
    }

    async fn read_node(&self, key: &str, response: reqwest::Response) -> StoreResult<Node> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(error_from_body(key, status, &body));
        }

        let parsed: KeysResponse =
            serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))?;
        parsed
            .node
            .ok_or_else(|| StoreError::Decode("response has no 'node'".to_string()))
    }
}

fn error_from_body(key: &str, status: StatusCode, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(err) if err.error_code == ERROR_KEY_NOT_FOUND => StoreError::KeyNotFound(key.to_string()),
        Ok(err) if err.error_code == ERROR_EVENT_INDEX_CLEARED => StoreError::IndexCleared {
            current_index: err.index,
        },
        Ok(err) => StoreError::Server {
            code: err.error_code,
            message: err.message,
        },
        Err(_) => StoreError::Server {
            code: i64::from(status.as_u16()),
            message: String::from_utf8_lossy(body).trim().to_string(),
        },
    }
}

/// A connection to one etcd endpoint.
pub struct EtcdClient {
    inner: EtcdHttp,
    retry_base: Duration,
    retry_max: Duration,
    watches: DashMap<WatchId, JoinHandle<()>>,
    next_watch_id: AtomicU64,
}

impl EtcdClient {
    /// Build a client for the configured endpoint. No request is made.
    pub fn new(config: &StoreConfig, call_timeout: Duration) -> StoreResult<Self> {
        let tls = config.tls_files();
        let scheme = if tls.is_some() { "https" } else { "http" };
        let host = if config.addr.contains(':') && !config.addr.starts_with('[') {
            format!("[{}]", config.addr)
        } else {
            config.addr.clone()
        };

        let base_url = Url::parse(&format!("{}://{}:{}/", scheme, host, config.port)).map_err(
            |e| StoreError::Connection(format!("invalid store address '{}': {}", config.addr, e)),
        )?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(call_timeout)
            .no_proxy();
        if let Some(files) = tls {
            let material = load_tls_material(&files)?;
            builder = builder
                .add_root_certificate(material.ca_cert)
                .identity(material.identity);
        }
        let http = builder
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            inner: EtcdHttp {
                http,
                base_url,
                call_timeout,
            },
            retry_base: Duration::from_secs(2),
            retry_max: Duration::from_secs(30),
            watches: DashMap::new(),
            next_watch_id: AtomicU64::new(1),
        })
    }

    pub fn with_retry(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base = base;
        self.retry_max = max;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Number of callback watches currently running.
    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }
}

#[async_trait]
impl StoreClient for EtcdClient {
    async fn get(&self, key: &str) -> StoreResult<KeyValue> {
        self.inner.get(key).await
    }

    async fn wait_for_change(&self, key: &str, index: u64) -> StoreResult<Option<u64>> {
        self.inner.wait_for_change(key, index).await
    }

    async fn add_watch_callback(&self, key: &str, callback: WatchCallback) -> StoreResult<WatchId> {
        // Start from the current index; also fails the install when the
        // store is unreachable.
        let current = self.inner.get(key).await?;

        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::Relaxed));
        let task = CallbackWatch {
            http: self.inner.clone(),
            key: key.to_string(),
            next_index: current.store_index + 1,
            callback,
            retry_base: self.retry_base,
            retry_max: self.retry_max,
        };
        let handle = tokio::spawn(task.run().in_current_span());
        self.watches.insert(id, handle);

        tracing::debug!(key = %key, watch_id = id.0, "Watch callback registered");
        Ok(id)
    }

    async fn cancel_watch(&self, id: WatchId) {
        if let Some((_, handle)) = self.watches.remove(&id) {
            handle.abort();
            let _ = handle.await;
            tracing::debug!(watch_id = id.0, "Watch callback cancelled");
        }
    }

    async fn status(&self) -> StoreResult<StoreStatus> {
        self.inner.status().await
    }
}

impl Drop for EtcdClient {
    fn drop(&mut self) {
        for entry in self.watches.iter() {
            entry.value().abort();
        }
    }
}

struct CallbackWatch {
    http: EtcdHttp,
    key: String,
    next_index: u64,
    callback: WatchCallback,
    retry_base: Duration,
    retry_max: Duration,
}

impl CallbackWatch {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            match self.http.wait_for_change(&self.key, self.next_index).await {
                Ok(Some(modified_index)) => {
                    attempt = 0;
                    self.next_index = modified_index + 1;
                    (self.callback)(WatchEvent { modified_index }).await;
                }
                Ok(None) => attempt = 0,
                Err(StoreError::IndexCleared { current_index }) => {
                    // Changes in between are lost; report one at the current index.
                    attempt = 0;
                    self.next_index = current_index + 1;
                    (self.callback)(WatchEvent {
                        modified_index: current_index,
                    })
                    .await;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = calculate_backoff(attempt, self.retry_base, self.retry_max);
                    tracing::debug!(key = %self.key, error = %e, delay = ?delay, "Watch request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
