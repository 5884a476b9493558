//! Feed Broadcast Hub
//!
//! Typed broadcast channels fanning the merged feed out to consumers:
//! one channel for price updates, one for connection state transitions.
//! Each channel supports any number of receivers with configurable
//! capacity; slow receivers lag rather than block producers.

use tokio::sync::broadcast;

use crate::domain::price::PriceUpdate;
use crate::infrastructure::stream::ConnectionState;

/// Configuration for hub channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of the price update channel.
    pub update_capacity: usize,
    /// Capacity of the connection state channel.
    pub state_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            update_capacity: 4_096,
            state_capacity: 64,
        }
    }
}

/// Central broadcast hub for the merged price feed.
///
/// # Example
///
/// ```rust
/// use price_feed::infrastructure::feed::FeedHub;
///
/// let hub = FeedHub::with_defaults();
/// let updates = hub.updates_rx();
/// let states = hub.state_rx();
/// # drop((updates, states));
/// ```
#[derive(Debug)]
pub struct FeedHub {
    updates_tx: broadcast::Sender<PriceUpdate>,
    state_tx: broadcast::Sender<ConnectionState>,
}

impl FeedHub {
    /// Create a hub with the given capacities.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            updates_tx: broadcast::channel(config.update_capacity).0,
            state_tx: broadcast::channel(config.state_capacity).0,
        }
    }

    /// Create a hub with default capacities.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HubConfig::default())
    }

    /// Publish a price update to all receivers.
    ///
    /// Returns the number of receivers reached, or `None` when nobody is
    /// listening.
    pub fn publish_update(&self, update: PriceUpdate) -> Option<usize> {
        self.updates_tx.send(update).ok()
    }

    /// A new receiver for price updates.
    #[must_use]
    pub fn updates_rx(&self) -> broadcast::Receiver<PriceUpdate> {
        self.updates_tx.subscribe()
    }

    /// Number of live update receivers.
    #[must_use]
    pub fn update_receiver_count(&self) -> usize {
        self.updates_tx.receiver_count()
    }

    /// Publish a connection state transition to all receivers.
    pub fn publish_state(&self, state: ConnectionState) -> Option<usize> {
        self.state_tx.send(state).ok()
    }

    /// A new receiver for connection state transitions.
    #[must_use]
    pub fn state_rx(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Clone of the state sender, for the component that owns transitions.
    #[must_use]
    pub fn state_sender(&self) -> broadcast::Sender<ConnectionState> {
        self.state_tx.clone()
    }

    /// Number of live state receivers.
    #[must_use]
    pub fn state_receiver_count(&self) -> usize {
        self.state_tx.receiver_count()
    }
}
