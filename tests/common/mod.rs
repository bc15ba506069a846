//! Shared utilities for integration tests.
//!
//! `MockEtcd` speaks just enough of the etcd v2 keys API over raw TCP for the
//! watcher: plain reads, long-poll reads, compaction errors and `/version`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use topology_watcher::config::StoreConfig;

pub const TOPOLOGY_PATH: &str = "/v2/keys/romana/ipam/data";

struct EtcdState {
    doc: Mutex<Option<(String, u64)>>,
    index: watch::Sender<u64>,
    cleared_below: AtomicU64,
    healthy: AtomicBool,
    requests: Mutex<Vec<String>>,
}

/// A programmable single-key etcd.
#[derive(Clone)]
pub struct MockEtcd {
    pub addr: SocketAddr,
    state: Arc<EtcdState>,
}

impl MockEtcd {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (index, _) = watch::channel(0);
        let state = Arc::new(EtcdState {
            doc: Mutex::new(None),
            index,
            cleared_below: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        tokio::spawn(handle_connection(socket, server_state.clone()));
                    }
                    Err(_) => break,
                }
            }
        });

        Self { addr, state }
    }

    /// Store config pointing at this server.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            addr: self.addr.ip().to_string(),
            port: u32::from(self.addr.port()),
            ..Default::default()
        }
    }

    /// Write the topology document; returns its modification index.
    pub fn set_document(&self, doc: &str) -> u64 {
        let index = *self.state.index.borrow() + 1;
        *self.state.doc.lock().unwrap() = Some((doc.to_string(), index));
        self.state.index.send_replace(index);
        index
    }

    /// Pretend history below `index` has been compacted away.
    pub fn compact(&self, index: u64) {
        self.state.cleared_below.store(index, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Request targets seen so far, e.g. `/v2/keys/...?wait=true&waitIndex=3`.
    pub fn requests(&self) -> Vec<String> {
        self.state.requests.lock().unwrap().clone()
    }
}

/// A local port with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll `cond` every few milliseconds, panicking after five seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within timeout");
}

async fn handle_connection(mut socket: TcpStream, state: Arc<EtcdState>) {
    let Some(target) = read_request_target(&mut socket).await else {
        return;
    };
    state.requests.lock().unwrap().push(target.clone());

    let url = url::Url::parse(&format!("http://mock{}", target)).unwrap();
    let (status, index, body) = match url.path() {
        "/version" => {
            if state.healthy.load(Ordering::SeqCst) {
                (200, None, json!({"etcdserver": "2.3.8", "etcdcluster": "2.3.0"}).to_string())
            } else {
                (500, None, "etcd is unhealthy".to_string())
            }
        }
        TOPOLOGY_PATH => {
            let wait_index = url
                .query_pairs()
                .find(|(k, _)| k == "waitIndex")
                .and_then(|(_, v)| v.parse::<u64>().ok());
            match wait_index {
                Some(wait_index) => long_poll(&state, wait_index).await,
                None => read_key(&state),
            }
        }
        _ => (404, None, "404 page not found".to_string()),
    };

    let status_text = match status {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        _ => "500 Internal Server Error",
    };
    let index_header = index
        .map(|i| format!("X-Etcd-Index: {}\r\n", i))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        index_header,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request_target(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(str::to_string)
}

fn read_key(state: &EtcdState) -> (u16, Option<u64>, String) {
    let current = *state.index.borrow();
    match state.doc.lock().unwrap().clone() {
        Some((value, modified)) => (200, Some(current), node_body("get", &value, modified)),
        None => (
            404,
            Some(current),
            json!({
                "errorCode": 100,
                "message": "Key not found",
                "cause": "/romana",
                "index": current,
            })
            .to_string(),
        ),
    }
}

async fn long_poll(state: &EtcdState, wait_index: u64) -> (u16, Option<u64>, String) {
    let current = *state.index.borrow();
    if wait_index < state.cleared_below.load(Ordering::SeqCst) {
        let body = json!({
            "errorCode": 401,
            "message": "The event in requested index is outdated and cleared",
            "cause": format!("the requested history has been cleared [{}/{}]", current, wait_index),
            "index": current,
        });
        return (400, Some(current), body.to_string());
    }

    let mut rx = state.index.subscribe();
    if rx.wait_for(|i| *i >= wait_index).await.is_err() {
        return (500, None, "shutting down".to_string());
    }
    let (value, modified) = match state.doc.lock().unwrap().clone() {
        Some(doc) => doc,
        None => return (500, None, "no document".to_string()),
    };
    (200, Some(modified), node_body("set", &value, modified))
}

fn node_body(action: &str, value: &str, modified: u64) -> String {
    json!({
        "action": action,
        "node": {
            "key": "/romana/ipam/data",
            "value": value,
            "modifiedIndex": modified,
            "createdIndex": 1,
        }
    })
    .to_string()
}
