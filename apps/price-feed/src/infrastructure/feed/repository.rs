//! Price Repository
//!
//! Composition root of the feed. Registers consumer interest, forwards the
//! resulting deltas to the streaming client, engages the fallback poller
//! while the stream is not connected, and merges both sources into one
//! arrival-ordered update stream — deduplicated by timestamp and tagged
//! with a direction — published through the [`FeedHub`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::price::{CoinId, PriceBook, PriceTick, PriceUpdate};
use crate::domain::subscription::{
    ConsumerId, InterestChanges, InterestHandle, SubscriptionManager,
};
use crate::infrastructure::feed::FeedHub;
use crate::infrastructure::poller::FallbackPoller;
use crate::infrastructure::stream::{ConnectionState, StreamClient};

/// Errors that can occur in the repository.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// `run()` was called more than once.
    #[error("repository merge loop already started")]
    AlreadyRunning,
}

/// Inbound tick channels consumed by the merge loop.
struct MergeInputs {
    stream_rx: mpsc::Receiver<PriceTick>,
    poll_rx: mpsc::Receiver<PriceTick>,
}

/// The continuous price-update feed shared by all consumers.
///
/// One instance per process owns the streaming client, the poller, and the
/// last-known-price book. Consumers interact only through
/// [`subscribe`](Self::subscribe) / [`unsubscribe`](Self::unsubscribe) and
/// the hub's broadcast receivers.
pub struct PriceRepository {
    interest: Arc<SubscriptionManager>,
    stream: Arc<StreamClient>,
    poller: Arc<FallbackPoller>,
    hub: Arc<FeedHub>,
    book: Mutex<PriceBook>,
    inputs: Mutex<Option<MergeInputs>>,
    poll_guard: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl PriceRepository {
    /// Create a repository over its collaborators.
    ///
    /// `stream_rx` and `poll_rx` are the receiving halves of the channels
    /// the streaming client and poller were constructed with.
    #[must_use]
    pub fn new(
        interest: Arc<SubscriptionManager>,
        stream: Arc<StreamClient>,
        poller: Arc<FallbackPoller>,
        hub: Arc<FeedHub>,
        stream_rx: mpsc::Receiver<PriceTick>,
        poll_rx: mpsc::Receiver<PriceTick>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            interest,
            stream,
            poller,
            hub,
            book: Mutex::new(PriceBook::new()),
            inputs: Mutex::new(Some(MergeInputs { stream_rx, poll_rx })),
            poll_guard: Mutex::new(None),
            cancel,
        }
    }

    /// Register that `consumer` wants exactly `coins`.
    ///
    /// Forwards the interest delta downstream and engages the fallback
    /// poller when the stream is not currently connected. Must be called
    /// from within a tokio runtime.
    pub fn subscribe(&self, consumer: ConsumerId, coins: &[CoinId]) -> InterestHandle {
        let (handle, changes) = self.interest.acquire(consumer, coins);
        self.apply_changes(changes);

        if self.stream.state() != ConnectionState::Connected {
            self.engage_poller();
        }

        handle
    }

    /// Release a consumer's interest set.
    pub fn unsubscribe(&self, handle: &InterestHandle) {
        let changes = self.interest.release(handle);
        self.apply_changes(changes);
    }

    /// A new receiver for the merged update feed.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<PriceUpdate> {
        self.hub.updates_rx()
    }

    /// A new receiver for connection state transitions.
    #[must_use]
    pub fn connection_states(&self) -> broadcast::Receiver<ConnectionState> {
        self.hub.state_rx()
    }

    /// Current connection state snapshot.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Forward an interest delta to the streaming client.
    fn apply_changes(&self, changes: InterestChanges) {
        if changes.is_empty() {
            return;
        }

        // Coins nobody wants anymore lose their direction baseline, so a
        // later re-subscription starts from Unchanged.
        if !changes.unsubscribe.is_empty() {
            let mut book = self.book.lock();
            for coin in &changes.unsubscribe {
                book.forget(coin);
            }
        }

        if !changes.subscribe.is_empty() {
            self.stream.subscribe(changes.subscribe.into_iter().collect());
        }
        if !changes.unsubscribe.is_empty() {
            self.stream
                .unsubscribe(changes.unsubscribe.into_iter().collect());
        }
    }

    /// Run the merge loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only if called more than once.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedError> {
        let MergeInputs {
            mut stream_rx,
            mut poll_rx,
        } = self
            .inputs
            .lock()
            .take()
            .ok_or(FeedError::AlreadyRunning)?;

        let mut states = self.hub.state_rx();
        let mut stream_open = true;
        let mut poll_open = true;
        let mut states_open = true;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.disengage_poller();
                    return Ok(());
                }
                tick = stream_rx.recv(), if stream_open => match tick {
                    Some(tick) => self.ingest(tick),
                    None => stream_open = false,
                },
                tick = poll_rx.recv(), if poll_open => match tick {
                    Some(tick) => self.ingest(tick),
                    None => poll_open = false,
                },
                state = states.recv(), if states_open => match state {
                    Ok(ConnectionState::Connected) => self.disengage_poller(),
                    Ok(_) => self.engage_poller(),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Resynchronize from the snapshot.
                        tracing::warn!(missed, "state receiver lagged");
                        if self.stream.state() == ConnectionState::Connected {
                            self.disengage_poller();
                        } else {
                            self.engage_poller();
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => states_open = false,
                },
            }
        }
    }

    /// Run one tick through interest filtering and the price book.
    fn ingest(&self, tick: PriceTick) {
        // Updates for coins nobody wants are discarded without touching
        // stored state.
        if !self.interest.is_interesting(&tick.coin_id) {
            tracing::trace!(coin = %tick.coin_id, "dropping tick for uninteresting coin");
            return;
        }

        let mut book = self.book.lock();
        if let Some(update) = book.apply(tick) {
            // Publish under the lock: stored state and emission move together.
            let _ = self.hub.publish_update(update);
        }
    }

    /// Start the poll loop if it is not already running.
    fn engage_poller(&self) {
        let mut guard = self.poll_guard.lock();
        if guard.is_some() {
            return;
        }

        let token = self.cancel.child_token();
        *guard = Some(token.clone());
        tokio::spawn(Arc::clone(&self.poller).run(token));
        tracing::info!("fallback poller engaged");
    }

    /// Stop the poll loop if it is running.
    fn disengage_poller(&self) {
        if let Some(token) = self.poll_guard.lock().take() {
            token.cancel();
            tracing::info!("fallback poller disengaged");
        }
    }

    /// Tear down the feed: stops the poller, closes the transport, and
    /// cancels the merge loop and any pending reconnect timer.
    pub fn shutdown(&self) {
        self.stream.disconnect();
        self.disengage_poller();
        self.cancel.cancel();
    }
}
