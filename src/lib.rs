//! Topology watcher for etcd.
//!
//! Watches the topology document stored at `/romana/ipam/data` and turns
//! every version of it into a [`RouteSpec`](topology::RouteSpec): a map from
//! destination CIDR to the gateway IPs that serve it.

pub mod admin;
pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;
pub mod topology;
pub mod watcher;

pub use config::schema::WatcherConfig;
pub use topology::RouteSpec;
pub use watcher::{TopologyWatcher, WatcherPlugin};
