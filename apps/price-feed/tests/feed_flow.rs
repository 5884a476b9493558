//! Feed Flow Integration Tests
//!
//! Exercises the price repository end to end: fallback polling before the
//! stream connects, stream takeover, interest filtering, and the
//! multi-consumer release contract.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use price_feed::{
    CoinId, ConnectionState, FallbackPoller, FeedHub, ObservePriceUpdates, PollerConfig,
    PriceDirection, PriceRepository, PriceSource, PriceSourceError, PriceTick, PriceUpdate,
    StreamClient, StreamClientConfig, SubscriptionManager, UpdateSource,
};

/// Price source answering batch fetches from a scripted queue.
///
/// Once the script runs out it answers with empty batches.
struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<PriceTick>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<PriceTick>>) -> Self {
        Self {
            batches: Mutex::new(batches.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_price(&self, _coin_id: &str) -> Result<PriceTick, PriceSourceError> {
        Err(PriceSourceError::Request("batch-only source".to_string()))
    }

    async fn fetch_prices(&self, _coin_ids: &[CoinId]) -> Result<Vec<PriceTick>, PriceSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batches.lock().pop_front().unwrap_or_default())
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn poll_tick(coin: &str, price: i64, secs: i64) -> PriceTick {
    PriceTick {
        coin_id: coin.to_string(),
        price: Decimal::from(price),
        timestamp: ts(secs),
        source: UpdateSource::Poll,
    }
}

fn stream_tick(coin: &str, price: i64, secs: i64) -> PriceTick {
    PriceTick {
        coin_id: coin.to_string(),
        price: Decimal::from(price),
        timestamp: ts(secs),
        source: UpdateSource::Stream,
    }
}

struct Harness {
    repository: Arc<PriceRepository>,
    observe: ObservePriceUpdates,
    hub: Arc<FeedHub>,
    source: Arc<ScriptedSource>,
    stream_tx: mpsc::Sender<PriceTick>,
    cancel: CancellationToken,
}

/// Wire the full repository with a scripted poll source and a stream client
/// that is never run; stream ticks are injected through `stream_tx` and
/// connection transitions through the hub.
fn harness(batches: Vec<Vec<PriceTick>>) -> Harness {
    let interest = Arc::new(SubscriptionManager::new());
    let hub = Arc::new(FeedHub::with_defaults());
    let cancel = CancellationToken::new();

    let (stream_tx, stream_rx) = mpsc::channel(64);
    let (poll_tx, poll_rx) = mpsc::channel(64);

    let stream = Arc::new(StreamClient::new(
        StreamClientConfig::new("ws://127.0.0.1:1"),
        Arc::clone(&interest),
        stream_tx.clone(),
        hub.state_sender(),
        cancel.clone(),
    ));

    let source = Arc::new(ScriptedSource::new(batches));
    let poller = Arc::new(FallbackPoller::new(
        PollerConfig {
            interval: Duration::from_millis(25),
            max_concurrency: 2,
        },
        Arc::clone(&source) as Arc<dyn PriceSource>,
        Arc::clone(&interest),
        poll_tx,
    ));

    let repository = Arc::new(PriceRepository::new(
        interest,
        stream,
        poller,
        Arc::clone(&hub),
        stream_rx,
        poll_rx,
        cancel.clone(),
    ));

    let runner = Arc::clone(&repository);
    tokio::spawn(async move { runner.run().await });

    let observe = ObservePriceUpdates::new(Arc::clone(&repository));

    Harness {
        repository,
        observe,
        hub,
        source,
        stream_tx,
        cancel,
    }
}

async fn next_update(rx: &mut tokio::sync::broadcast::Receiver<PriceUpdate>) -> PriceUpdate {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("update channel closed")
}

#[tokio::test]
async fn poller_feeds_consumers_until_the_stream_takes_over() {
    let harness = harness(vec![vec![poll_tick("bitcoin", 100, 1)]]);

    // Stream is disconnected, so subscribing engages the poller.
    let subscription = harness
        .observe
        .subscribe(1, &["bitcoin".to_string(), "ethereum".to_string()]);
    let mut updates = subscription.updates;

    let first = next_update(&mut updates).await;
    assert_eq!(first.coin_id, "bitcoin");
    assert_eq!(first.price, Decimal::from(100));
    assert_eq!(first.direction, PriceDirection::Unchanged);
    assert_eq!(first.source, UpdateSource::Poll);

    // The stream comes up: poller stops, push updates flow.
    harness.hub.publish_state(ConnectionState::Connected);
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 105, 2))
        .await
        .unwrap();

    let second = next_update(&mut updates).await;
    assert_eq!(second.price, Decimal::from(105));
    assert_eq!(second.direction, PriceDirection::Up);
    assert_eq!(second.source, UpdateSource::Stream);

    harness.cancel.cancel();
}

#[tokio::test]
async fn poller_is_disengaged_once_connected() {
    let harness = harness(vec![vec![poll_tick("bitcoin", 100, 1)]]);

    let subscription = harness.observe.subscribe(1, &["bitcoin".to_string()]);
    let mut updates = subscription.updates;

    // Wait until the poller has actually run once.
    let _ = next_update(&mut updates).await;

    harness.hub.publish_state(ConnectionState::Connected);
    // Give the merge loop time to observe the transition.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls_after_connect = harness.source.calls();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        harness.source.calls(),
        calls_after_connect,
        "poller kept polling after the stream connected"
    );

    // Losing the connection re-engages it.
    harness.hub.publish_state(ConnectionState::Reconnecting);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.source.calls() > calls_after_connect);

    harness.cancel.cancel();
}

#[tokio::test]
async fn updates_for_unwanted_coins_are_discarded() {
    let harness = harness(vec![]);

    let subscription = harness.observe.subscribe(1, &["bitcoin".to_string()]);
    let mut updates = subscription.updates;

    // An update for a coin nobody asked for never surfaces, and must not
    // seed direction state either.
    harness
        .stream_tx
        .send(stream_tick("ethereum", 999, 1))
        .await
        .unwrap();
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 100, 2))
        .await
        .unwrap();

    let update = next_update(&mut updates).await;
    assert_eq!(update.coin_id, "bitcoin");

    harness.cancel.cancel();
}

#[tokio::test]
async fn out_of_order_stream_ticks_never_surface() {
    let harness = harness(vec![]);

    let subscription = harness.observe.subscribe(1, &["bitcoin".to_string()]);
    let mut updates = subscription.updates;

    harness
        .stream_tx
        .send(stream_tick("bitcoin", 100, 10))
        .await
        .unwrap();
    // Stale tick: arrives later, timestamped earlier.
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 500, 5))
        .await
        .unwrap();
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 99, 11))
        .await
        .unwrap();

    assert_eq!(next_update(&mut updates).await.price, Decimal::from(100));
    let last = next_update(&mut updates).await;
    assert_eq!(last.price, Decimal::from(99));
    assert_eq!(last.direction, PriceDirection::Down);

    harness.cancel.cancel();
}

#[tokio::test]
async fn interest_survives_until_the_last_consumer_releases() {
    let harness = harness(vec![]);

    let a = harness.observe.subscribe(1, &["bitcoin".to_string()]);
    let b = harness
        .observe
        .subscribe(2, &["bitcoin".to_string(), "ethereum".to_string()]);

    // A releases; B still holds bitcoin.
    harness.observe.release(&a.handle);

    let mut updates = harness.repository.updates();
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 100, 1))
        .await
        .unwrap();
    assert_eq!(next_update(&mut updates).await.coin_id, "bitcoin");

    // B releases too; bitcoin updates are now discarded.
    harness.observe.release(&b.handle);
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 101, 2))
        .await
        .unwrap();
    harness
        .stream_tx
        .send(stream_tick("solana", 1, 3))
        .await
        .unwrap();

    let nothing = timeout(Duration::from_millis(200), updates.recv()).await;
    assert!(nothing.is_err(), "update surfaced after all consumers released");

    harness.cancel.cancel();
}

#[tokio::test]
async fn resubscribing_starts_from_a_fresh_baseline() {
    let harness = harness(vec![]);

    let first = harness.observe.subscribe(1, &["bitcoin".to_string()]);
    let mut updates = harness.repository.updates();

    harness
        .stream_tx
        .send(stream_tick("bitcoin", 100, 1))
        .await
        .unwrap();
    let _ = next_update(&mut updates).await;

    harness.observe.release(&first.handle);
    let _second = harness.observe.subscribe(1, &["bitcoin".to_string()]);

    // Lower than the pre-release price, but the baseline was cleared.
    harness
        .stream_tx
        .send(stream_tick("bitcoin", 50, 2))
        .await
        .unwrap();
    assert_eq!(
        next_update(&mut updates).await.direction,
        PriceDirection::Unchanged
    );

    harness.cancel.cancel();
}
