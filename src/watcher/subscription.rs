//! Change subscriptions on the topology key.
//!
//! Two strategies implement [`ChangeSubscription`]:
//! - [`CallbackSubscription`]: the store client runs a callback per change.
//! - [`PollSubscription`]: a dedicated task long-polls from a tracked index.
//!
//! The supervisor installs one per cycle and cancels it on teardown. A
//! strategy reports a failure that needs a reconnect through
//! [`WatchFlags::mark_broken`].

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::WatchMode;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::with_timeout;
use crate::store::{StoreClient, StoreError, WatchCallback, WatchEvent, WatchId};
use crate::watcher::publisher::TopologyPublisher;
use crate::watcher::state::WatchFlags;
use crate::watcher::{WatchError, WatcherSettings, TOPOLOGY_KEY};

/// Everything a subscription needs for one cycle.
#[derive(Clone)]
pub struct SubscriptionContext {
    pub client: Arc<dyn StoreClient>,
    pub publisher: Arc<TopologyPublisher>,
    pub flags: Arc<WatchFlags>,
    pub settings: WatcherSettings,
}

/// A strategy for being told about changes to the topology key.
#[async_trait]
pub trait ChangeSubscription: Send + Sync {
    async fn install(&self, ctx: SubscriptionContext) -> Result<Box<dyn ActiveWatch>, WatchError>;
}

/// An installed subscription.
#[async_trait]
pub trait ActiveWatch: Send {
    /// Stop delivering changes. Nothing runs on behalf of the watch after
    /// this returns.
    async fn cancel(self: Box<Self>);
}

/// The strategy for a configured watch mode.
pub fn subscription_for(mode: WatchMode) -> Box<dyn ChangeSubscription> {
    match mode {
        WatchMode::Callback => Box::new(CallbackSubscription),
        WatchMode::Poll => Box::new(PollSubscription),
    }
}

pub struct CallbackSubscription;

#[async_trait]
impl ChangeSubscription for CallbackSubscription {
    async fn install(&self, ctx: SubscriptionContext) -> Result<Box<dyn ActiveWatch>, WatchError> {
        // The callback only holds a weak handle; the supervisor owns the client.
        let client = Arc::downgrade(&ctx.client);
        let publisher = ctx.publisher.clone();
        let callback: WatchCallback = Arc::new(move |event: WatchEvent| {
            let client = client.clone();
            let publisher = publisher.clone();
            async move {
                tracing::info!(
                    modified_index = event.modified_index,
                    "Detected topology change in topology data"
                );
                if let Some(client) = client.upgrade() {
                    publisher.load_and_publish(client.as_ref()).await;
                }
            }
            .boxed()
        });

        let id = with_timeout(
            ctx.settings.call_timeout,
            ctx.client.add_watch_callback(TOPOLOGY_KEY, callback),
        )
        .await
        .map_err(WatchError::Install)?;
        let watch = CallbackWatch {
            client: ctx.client.clone(),
            id,
        };

        // Changes after the initial read but before the watch started
        // produce no callback.
        if let Err(e) = ctx.publisher.catch_up(ctx.client.as_ref()).await {
            Box::new(watch).cancel().await;
            return Err(WatchError::Install(e));
        }

        Ok(Box::new(watch))
    }
}

struct CallbackWatch {
    client: Arc<dyn StoreClient>,
    id: WatchId,
}

#[async_trait]
impl ActiveWatch for CallbackWatch {
    async fn cancel(self: Box<Self>) {
        tracing::debug!("Cancel watch on '{}'", TOPOLOGY_KEY);
        self.client.cancel_watch(self.id).await;
    }
}

pub struct PollSubscription;

#[async_trait]
impl ChangeSubscription for PollSubscription {
    async fn install(&self, ctx: SubscriptionContext) -> Result<Box<dyn ActiveWatch>, WatchError> {
        let task = tokio::spawn(poll_loop(ctx).in_current_span());
        Ok(Box::new(PollWatch { task }))
    }
}

struct PollWatch {
    task: JoinHandle<()>,
}

#[async_trait]
impl ActiveWatch for PollWatch {
    async fn cancel(self: Box<Self>) {
        tracing::debug!("Stop watch task on '{}'", TOPOLOGY_KEY);
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn poll_loop(ctx: SubscriptionContext) {
    let SubscriptionContext {
        client,
        publisher,
        flags,
        settings,
    } = ctx;

    // The document may have changed since the supervisor's initial read.
    let current = match with_timeout(settings.call_timeout, client.get(TOPOLOGY_KEY)).await {
        Ok(kv) => kv,
        Err(e) => {
            tracing::warn!("Cannot start watch loop: {}", e);
            flags.mark_broken();
            return;
        }
    };
    publisher.publish_if_unseen(&current);

    let mut next_index = current.store_index + 1;
    let mut attempt = 0u32;
    loop {
        match with_timeout(
            settings.call_timeout,
            client.wait_for_change(TOPOLOGY_KEY, next_index),
        )
        .await
        {
            Ok(Some(modified_index)) => {
                attempt = 0;
                next_index = modified_index + 1;
                tracing::info!(modified_index, "Detected topology change in topology data");
                publisher.load_and_publish(client.as_ref()).await;
            }
            Ok(None) | Err(StoreError::Timeout(_)) => attempt = 0,
            Err(StoreError::IndexCleared { current_index }) => {
                attempt = 0;
                next_index = current_index + 1;
                tracing::info!(
                    current_index,
                    "Watch index cleared, reloading topology data"
                );
                publisher.load_and_publish(client.as_ref()).await;
            }
            Err(e) => {
                attempt = attempt.saturating_add(1);
                let delay =
                    calculate_backoff(attempt, settings.poll_retry_base, settings.poll_retry_max);
                tracing::debug!(error = %e, delay = ?delay, "Watch poll failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
