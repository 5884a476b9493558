//! Observe-Price-Updates Use Case
//!
//! The thin façade presentation code talks to: register a consumer's
//! interest set, hand back the merged feed, and deregister on release.
//! Release is explicit — dropping a [`PriceFeedSubscription`] does not
//! tear down interest.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::price::{CoinId, PriceUpdate};
use crate::domain::subscription::{ConsumerId, InterestHandle};
use crate::infrastructure::feed::PriceRepository;
use crate::infrastructure::stream::ConnectionState;

/// A consumer's live view of the feed.
pub struct PriceFeedSubscription {
    /// Handle used to release the interest set.
    pub handle: InterestHandle,
    /// Merged price update feed (stream and polling fallback).
    pub updates: broadcast::Receiver<PriceUpdate>,
    /// Connection state transitions, for staleness indicators.
    pub states: broadcast::Receiver<ConnectionState>,
}

impl PriceFeedSubscription {
    /// Consume the subscription into a `Stream` of price updates plus the
    /// release handle.
    ///
    /// Lagged gaps surface as stream errors; the feed itself never ends
    /// while the repository is alive.
    #[must_use]
    pub fn into_stream(self) -> (InterestHandle, BroadcastStream<PriceUpdate>) {
        (self.handle, BroadcastStream::new(self.updates))
    }
}

/// Use case exposing the continuous price feed to consumers.
#[derive(Clone)]
pub struct ObservePriceUpdates {
    repository: Arc<PriceRepository>,
}

impl ObservePriceUpdates {
    /// Create the use case over the shared repository.
    #[must_use]
    pub const fn new(repository: Arc<PriceRepository>) -> Self {
        Self { repository }
    }

    /// Register that `consumer` wants exactly `coins` and return the feed.
    #[must_use]
    pub fn subscribe(&self, consumer: ConsumerId, coins: &[CoinId]) -> PriceFeedSubscription {
        let handle = self.repository.subscribe(consumer, coins);
        PriceFeedSubscription {
            handle,
            updates: self.repository.updates(),
            states: self.repository.connection_states(),
        }
    }

    /// Deregister the interest set behind a handle.
    pub fn release(&self, handle: &InterestHandle) {
        self.repository.unsubscribe(handle);
    }

    /// Current connection state, for one-shot indicator reads.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.repository.connection_state()
    }
}
