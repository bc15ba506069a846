//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → cli overrides (--etcd-addr, --etcd-port, ...)
//!     → validation.rs (semantic checks)
//!     → WatcherConfig (validated, immutable)
//!     → WatcherSettings for the supervisor
//! ```
//!
//! Every field has a default so that an empty file is a valid config.
//! Validation failures are the only errors a caller of the watcher sees.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AdminConfig, ObservabilityConfig, StoreConfig, TlsFiles, WatchConfig, WatchMode,
    WatcherConfig,
};
pub use validation::ValidationError;
