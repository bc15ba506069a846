//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the store:
//!     → timeouts.rs (every call has a deadline)
//!     → On long-poll failure: backoff.rs (exponential delay with jitter)
//!     → On health probe failure: the supervisor restarts the whole cycle
//! ```

pub mod backoff;
pub mod timeouts;
