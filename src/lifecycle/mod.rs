//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     stop() → trigger → supervisor wakes from its sleep → cleanup → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls TopologyWatcher::stop
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownListener};
