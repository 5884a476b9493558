//! Consumer Interest Tracking
//!
//! Reference-counted subscription state shared by all consumers of the feed.
//!
//! # Design
//!
//! Each consumer declares the full set of coins it wants (its interest set).
//! The manager tracks a reference count per coin across all consumers and
//! reports the minimal upstream delta whenever the union changes: a coin
//! whose count goes 0→1 needs a subscribe, a coin whose count reaches 0
//! needs an unsubscribe. Consumers never see the counts; they hold an opaque
//! [`InterestHandle`] and release through it.
//!
//! All mutation happens under a single mutex: replacing a consumer's set and
//! diffing the reference counts must be one critical section.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::domain::price::CoinId;

/// Unique identifier for a consumer of the feed.
pub type ConsumerId = u64;

/// Opaque handle to a consumer's registered interest set.
///
/// Handles are generation-stamped: acquiring again under the same consumer id
/// invalidates the previous handle, so a stale release cannot tear down the
/// successor's interest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterestHandle {
    consumer: ConsumerId,
    generation: u64,
}

impl InterestHandle {
    /// The consumer this handle belongs to.
    #[must_use]
    pub const fn consumer(&self) -> ConsumerId {
        self.consumer
    }
}

/// The minimal upstream delta produced by an interest change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestChanges {
    /// Coins that newly need an upstream subscription (refcount 0→1).
    pub subscribe: HashSet<CoinId>,
    /// Coins that no longer need one (refcount reached 0).
    pub unsubscribe: HashSet<CoinId>,
}

impl InterestChanges {
    /// Whether the change set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// A delta carrying only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(coins: impl IntoIterator<Item = CoinId>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: coins.into_iter().collect(),
        }
    }
}

/// Interest state guarded by the manager's mutex.
#[derive(Debug, Default)]
struct InterestState {
    /// Per-consumer interest set, tagged with the handle generation.
    consumers: HashMap<ConsumerId, (u64, HashSet<CoinId>)>,
    /// Reference count per coin across all consumers.
    refcounts: HashMap<CoinId, usize>,
    /// Next handle generation.
    next_generation: u64,
}

impl InterestState {
    /// Increment a coin's count, reporting whether it newly needs upstream.
    fn retain(&mut self, coin: &CoinId) -> bool {
        let count = self.refcounts.entry(coin.clone()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Decrement a coin's count, reporting whether it reached zero.
    fn drop_ref(&mut self, coin: &CoinId) -> bool {
        match self.refcounts.get_mut(coin) {
            Some(count) => {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.refcounts.remove(coin);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

/// Tracks which coins each consumer wants and derives upstream deltas.
///
/// # Example
///
/// ```rust
/// use price_feed::domain::subscription::SubscriptionManager;
///
/// let manager = SubscriptionManager::new();
///
/// let (a, changes) = manager.acquire(1, &["bitcoin".into(), "ethereum".into()]);
/// assert_eq!(changes.subscribe.len(), 2);
///
/// // A second consumer wanting bitcoin produces no upstream delta.
/// let (b, changes) = manager.acquire(2, &["bitcoin".into()]);
/// assert!(changes.is_empty());
///
/// // Releasing the first consumer only unsubscribes what nobody else holds.
/// let changes = manager.release(&a);
/// assert!(changes.unsubscribe.contains("ethereum"));
/// assert!(!changes.unsubscribe.contains("bitcoin"));
///
/// let changes = manager.release(&b);
/// assert!(changes.unsubscribe.contains("bitcoin"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: Mutex<InterestState>,
}

impl SubscriptionManager {
    /// Create a new manager with no registered interest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `consumer` wants exactly `coins`.
    ///
    /// Replaces any interest set previously held under the same consumer id
    /// (invalidating its handle). The returned delta carries coins that
    /// newly need an upstream subscription and coins that dropped to zero
    /// holders through the replacement.
    pub fn acquire(
        &self,
        consumer: ConsumerId,
        coins: &[CoinId],
    ) -> (InterestHandle, InterestChanges) {
        let wanted: HashSet<CoinId> = coins.iter().cloned().collect();
        let mut state = self.state.lock();

        let generation = state.next_generation;
        state.next_generation += 1;

        let previous = state
            .consumers
            .insert(consumer, (generation, wanted.clone()));

        let mut changes = InterestChanges::default();

        // Retain the new set before dropping the old one so coins present in
        // both never transit through zero.
        for coin in &wanted {
            if state.retain(coin) {
                changes.subscribe.insert(coin.clone());
            }
        }

        if let Some((_, old)) = previous {
            for coin in &old {
                if state.drop_ref(coin) {
                    changes.unsubscribe.insert(coin.clone());
                }
            }
        }

        (
            InterestHandle {
                consumer,
                generation,
            },
            changes,
        )
    }

    /// Remove the consumer's entire interest set.
    ///
    /// Coins whose reference count reaches zero are reported as
    /// no-longer-needed. A stale or already-released handle is a no-op.
    pub fn release(&self, handle: &InterestHandle) -> InterestChanges {
        let mut state = self.state.lock();

        // Only the live handle for this consumer may release.
        match state.consumers.get(&handle.consumer) {
            Some((generation, _)) if *generation == handle.generation => {}
            _ => return InterestChanges::default(),
        }

        let Some((_, coins)) = state.consumers.remove(&handle.consumer) else {
            return InterestChanges::default();
        };

        let released: Vec<CoinId> = coins
            .iter()
            .filter(|coin| state.drop_ref(coin))
            .cloned()
            .collect();

        InterestChanges::unsubscribe_only(released)
    }

    /// The union of all live consumers' interest sets.
    ///
    /// Used to resubscribe everything in one batch after a reconnect.
    #[must_use]
    pub fn current_interest(&self) -> Vec<CoinId> {
        self.state.lock().refcounts.keys().cloned().collect()
    }

    /// Whether any consumer currently wants the coin.
    #[must_use]
    pub fn is_interesting(&self, coin_id: &str) -> bool {
        self.state.lock().refcounts.contains_key(coin_id)
    }

    /// Current aggregate counts.
    #[must_use]
    pub fn stats(&self) -> InterestStats {
        let state = self.state.lock();
        InterestStats {
            coin_count: state.refcounts.len(),
            consumer_count: state.consumers.len(),
        }
    }
}

/// Aggregate interest counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterestStats {
    /// Number of coins with at least one holder.
    pub coin_count: usize,
    /// Number of consumers with a live interest set.
    pub consumer_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(ids: &[&str]) -> Vec<CoinId> {
        ids.iter().map(|id| (*id).to_string()).collect()
    }

    #[test]
    fn first_acquire_reports_all_coins() {
        let manager = SubscriptionManager::new();

        let (_, changes) = manager.acquire(1, &coins(&["bitcoin", "ethereum"]));

        assert_eq!(changes.subscribe.len(), 2);
        assert!(changes.subscribe.contains("bitcoin"));
        assert!(changes.subscribe.contains("ethereum"));
        assert!(changes.unsubscribe.is_empty());
    }

    #[test]
    fn shared_coin_produces_no_delta() {
        let manager = SubscriptionManager::new();
        manager.acquire(1, &coins(&["bitcoin"]));

        let (_, changes) = manager.acquire(2, &coins(&["bitcoin"]));

        assert!(changes.is_empty());
    }

    #[test]
    fn reacquire_same_set_is_idempotent() {
        let manager = SubscriptionManager::new();
        manager.acquire(1, &coins(&["bitcoin", "ethereum"]));

        let (_, changes) = manager.acquire(1, &coins(&["bitcoin", "ethereum"]));

        assert!(changes.is_empty());
    }

    #[test]
    fn replacement_reports_both_sides_of_the_diff() {
        let manager = SubscriptionManager::new();
        manager.acquire(1, &coins(&["bitcoin", "ethereum"]));

        let (_, changes) = manager.acquire(1, &coins(&["bitcoin", "solana"]));

        assert_eq!(changes.subscribe, coins(&["solana"]).into_iter().collect());
        assert_eq!(
            changes.unsubscribe,
            coins(&["ethereum"]).into_iter().collect()
        );
    }

    #[test]
    fn replacement_keeps_coins_shared_with_others() {
        let manager = SubscriptionManager::new();
        manager.acquire(1, &coins(&["bitcoin"]));
        manager.acquire(2, &coins(&["bitcoin", "ethereum"]));

        // Consumer 1 moves off bitcoin; consumer 2 still holds it.
        let (_, changes) = manager.acquire(1, &coins(&["solana"]));

        assert!(!changes.unsubscribe.contains("bitcoin"));
        assert!(changes.subscribe.contains("solana"));
    }

    #[test]
    fn release_last_holder_unsubscribes() {
        let manager = SubscriptionManager::new();
        let (handle, _) = manager.acquire(1, &coins(&["bitcoin"]));

        let changes = manager.release(&handle);

        assert!(changes.unsubscribe.contains("bitcoin"));
    }

    #[test]
    fn release_with_remaining_holder_is_silent() {
        let manager = SubscriptionManager::new();
        let (a, _) = manager.acquire(1, &coins(&["bitcoin"]));
        let (b, _) = manager.acquire(2, &coins(&["bitcoin", "ethereum"]));

        // A releases: bitcoin still held by B, no delta at all.
        let changes = manager.release(&a);
        assert!(changes.is_empty());

        // B releases: both coins go.
        let changes = manager.release(&b);
        assert_eq!(changes.unsubscribe.len(), 2);
        assert!(changes.unsubscribe.contains("bitcoin"));
        assert!(changes.unsubscribe.contains("ethereum"));
    }

    #[test]
    fn stale_handle_release_is_noop() {
        let manager = SubscriptionManager::new();
        let (stale, _) = manager.acquire(1, &coins(&["bitcoin"]));

        // Re-acquiring under the same consumer id invalidates the old handle.
        let (live, _) = manager.acquire(1, &coins(&["bitcoin", "ethereum"]));

        let changes = manager.release(&stale);
        assert!(changes.is_empty());
        assert_eq!(manager.current_interest().len(), 2);

        let changes = manager.release(&live);
        assert_eq!(changes.unsubscribe.len(), 2);
    }

    #[test]
    fn double_release_is_noop() {
        let manager = SubscriptionManager::new();
        let (handle, _) = manager.acquire(1, &coins(&["bitcoin"]));

        assert!(!manager.release(&handle).is_empty());
        assert!(manager.release(&handle).is_empty());
    }

    #[test]
    fn current_interest_is_the_union() {
        let manager = SubscriptionManager::new();
        manager.acquire(1, &coins(&["bitcoin", "ethereum"]));
        manager.acquire(2, &coins(&["ethereum", "solana"]));

        let mut interest = manager.current_interest();
        interest.sort();

        assert_eq!(interest, coins(&["bitcoin", "ethereum", "solana"]));
    }

    #[test]
    fn union_matches_refcounts_through_arbitrary_sequences() {
        let manager = SubscriptionManager::new();

        let (a, _) = manager.acquire(1, &coins(&["bitcoin", "ethereum"]));
        let (_b, _) = manager.acquire(2, &coins(&["bitcoin"]));
        manager.release(&a);
        let (_c, _) = manager.acquire(3, &coins(&["solana", "bitcoin"]));

        let mut interest = manager.current_interest();
        interest.sort();
        assert_eq!(interest, coins(&["bitcoin", "solana"]));

        let stats = manager.stats();
        assert_eq!(stats.coin_count, 2);
        assert_eq!(stats.consumer_count, 2);
    }

    #[test]
    fn is_interesting_tracks_refcounts() {
        let manager = SubscriptionManager::new();
        let (handle, _) = manager.acquire(1, &coins(&["bitcoin"]));

        assert!(manager.is_interesting("bitcoin"));
        assert!(!manager.is_interesting("ethereum"));

        manager.release(&handle);
        assert!(!manager.is_interesting("bitcoin"));
    }

    #[test]
    fn concurrent_acquires_are_serialized() {
        use std::sync::Arc;
        use std::thread;

        let manager = Arc::new(SubscriptionManager::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let m = Arc::clone(&manager);
            handles.push(thread::spawn(move || {
                m.acquire(i, &[format!("coin{i}"), "shared".to_string()]);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats.consumer_count, 10);
        // coin0..coin9 plus the shared coin.
        assert_eq!(stats.coin_count, 11);
    }

    #[test]
    fn concurrent_releases_drain_everything() {
        use std::sync::Arc;
        use std::thread;

        let manager = Arc::new(SubscriptionManager::new());
        let handles: Vec<_> = (0..10u64)
            .map(|i| manager.acquire(i, &coins(&["shared"])).0)
            .collect();

        let mut joins = vec![];
        for handle in handles {
            let m = Arc::clone(&manager);
            joins.push(thread::spawn(move || m.release(&handle)));
        }

        let unsubscribed: usize = joins
            .into_iter()
            .map(|j| j.join().unwrap().unsubscribe.len())
            .sum();

        // Exactly one release observed the count reach zero.
        assert_eq!(unsubscribed, 1);
        assert_eq!(manager.stats().coin_count, 0);
    }
}
