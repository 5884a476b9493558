//! Fallback Poller
//!
//! Periodic price fetching through the [`PriceSource`] port, used while the
//! streaming connection is down. The poller has no knowledge of connection
//! state; the price repository engages and disengages it.
//!
//! Each cycle fetches the subscription manager's full current interest —
//! in one batched request when the source supports it, otherwise one
//! request per coin with bounded concurrency. A failed cycle is logged and
//! retried on the next tick; only cancellation stops the loop.

pub mod rest;

pub use rest::RestPriceSource;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::PriceSource;
use crate::domain::price::PriceTick;
use crate::domain::subscription::SubscriptionManager;

/// Configuration for polling behavior.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between poll cycles.
    pub interval: Duration,
    /// Concurrent per-coin requests when the source cannot batch.
    pub max_concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_concurrency: 4,
        }
    }
}

/// Interval-driven price fetcher used while the stream is down.
pub struct FallbackPoller {
    config: PollerConfig,
    source: Arc<dyn PriceSource>,
    interest: Arc<SubscriptionManager>,
    update_tx: mpsc::Sender<PriceTick>,
}

impl FallbackPoller {
    /// Create a new poller.
    #[must_use]
    pub fn new(
        config: PollerConfig,
        source: Arc<dyn PriceSource>,
        interest: Arc<SubscriptionManager>,
        update_tx: mpsc::Sender<PriceTick>,
    ) -> Self {
        Self {
            config,
            source,
            interest,
            update_tx,
        }
    }

    /// Poll on the configured interval until cancelled.
    ///
    /// The first cycle runs immediately, so engaging the poller right after
    /// a subscribe produces data without waiting a full interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::debug!(interval_ms = self.config.interval.as_millis(), "poller engaged");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("poller disengaged");
                    return;
                }
                _ = interval.tick() => self.poll_cycle().await,
            }
        }
    }

    /// Fetch the current interest set once.
    async fn poll_cycle(&self) {
        let coins = self.interest.current_interest();
        if coins.is_empty() {
            return;
        }

        let ticks = if self.source.supports_batching() {
            match self.source.fetch_prices(&coins).await {
                Ok(ticks) => ticks,
                Err(e) => {
                    // Swallowed: the next tick retries.
                    tracing::warn!(error = %e, coins = coins.len(), "poll cycle failed");
                    return;
                }
            }
        } else {
            futures::stream::iter(coins)
                .map(|coin| {
                    let source = Arc::clone(&self.source);
                    async move {
                        match source.fetch_price(&coin).await {
                            Ok(tick) => Some(tick),
                            Err(e) => {
                                tracing::warn!(coin = %coin, error = %e, "poll fetch failed");
                                None
                            }
                        }
                    }
                })
                .buffer_unordered(self.config.max_concurrency.max(1))
                .filter_map(std::future::ready)
                .collect()
                .await
        };

        for tick in ticks {
            if self.update_tx.send(tick).await.is_err() {
                // Repository is gone; cancellation will follow.
                return;
            }
        }
    }
}
