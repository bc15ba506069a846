//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher, publisher, store client produce:
//!     → tracing events (logging.rs installs the subscriber)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout log lines
//!     → Prometheus scrape endpoint (optional)
//!     → admin status endpoint (see crate::admin)
//! ```

pub mod logging;
pub mod metrics;
