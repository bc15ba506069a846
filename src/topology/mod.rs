//! Topology document handling.
//!
//! # Data Flow
//! ```text
//! raw bytes from the store
//!     → serde_json::Value (decode)
//!     → model.rs (lenient typed view: networks, groups, hosts)
//!     → flatten.rs (post-order walk, CIDR → host IPs)
//!     → sanity.rs (CIDR / IP syntax check)
//!     → RouteSpec (immutable, handed to the output queue)
//! ```
//!
//! Nothing in this module performs I/O.

pub mod flatten;
pub mod model;
pub mod sanity;

use thiserror::Error;

pub use flatten::{flatten, parse_and_flatten, MAX_GROUP_DEPTH};
pub use model::{HostEntry, HostGroup, NetworkEntry, RouteSpec, TopologyDocument};
pub use sanity::validate_route_spec;

/// Errors raised while turning a topology document into a route spec.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The stored value is not valid JSON.
    #[error("cannot decode topology document: {0}")]
    Decode(#[from] serde_json::Error),

    /// The document has no `networks` object at the top level.
    #[error("topology document has no 'networks' mapping")]
    MissingNetworks,

    /// The assembled route spec failed the syntax check.
    #[error("invalid route spec: {0}")]
    InvalidRouteSpec(String),
}
