//! Heartbeat Manager
//!
//! Ping/pong liveness monitoring for the streaming connection. A missed pong
//! within the timeout window is reported as a [`HeartbeatEvent::Timeout`],
//! which the stream client treats as a transport error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Time without a pong before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(40),
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// A ping should be written to the socket.
    SendPing,
    /// No pong arrived within the timeout; restart the connection.
    Timeout,
}

/// Liveness state shared between the manager and the socket loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Fresh state with the clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record inbound liveness (a pong, or any server traffic).
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that a ping is in flight.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is awaiting its pong.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time since the last recorded pong.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }
}

/// Drives the ping schedule and detects pong timeouts.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled or a timeout is detected.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("heartbeat manager cancelled");
                    return;
                }
                _ = interval.tick() => {
                    if self.state.is_waiting_for_pong()
                        && self.state.time_since_pong() > self.config.pong_timeout
                    {
                        tracing::warn!(
                            elapsed_ms = self.state.time_since_pong().as_millis(),
                            "heartbeat timeout detected"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                        return;
                    }

                    if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
                        // Session loop is gone.
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_timeout, Duration::from_secs(40));
    }

    #[test]
    fn pong_clears_waiting_flag() {
        let state = HeartbeatState::new();

        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());

        state.record_pong();
        assert!(!state.is_waiting_for_pong());
        assert!(state.time_since_pong() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn emits_ping_requests_on_the_interval() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let manager = HeartbeatManager::new(
            HeartbeatConfig {
                ping_interval: Duration::from_secs(5),
                pong_timeout: Duration::from_secs(20),
            },
            Arc::clone(&state),
            tx,
            cancel.clone(),
        );
        tokio::spawn(manager.run());

        // First tick fires immediately; answer it to avoid a timeout.
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));
        state.record_pong();

        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pong_times_out() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let manager = HeartbeatManager::new(
            HeartbeatConfig {
                ping_interval: Duration::from_secs(5),
                pong_timeout: Duration::from_secs(8),
            },
            Arc::clone(&state),
            tx,
            cancel.clone(),
        );
        tokio::spawn(manager.run());

        // Ping goes out, never answered.
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));
        state.mark_ping_sent();

        // Next tick is within the timeout window, so another ping.
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));

        // By the following tick the pong is overdue.
        assert_eq!(rx.recv().await, Some(HeartbeatEvent::Timeout));
        assert!(rx.recv().await.is_none());
    }
}
