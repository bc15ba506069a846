//! Timeout enforcement.
//!
//! Every call to the store goes through a deadline so that a hung store
//! can delay shutdown by at most one call timeout.

use std::future::Future;
use std::time::Duration;

use crate::store::{StoreError, StoreResult};

/// Run a store call with a deadline.
pub async fn with_timeout<T, F>(duration: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}
