//! Streaming Client
//!
//! Owns the physical WebSocket connection to the price-streaming endpoint:
//! connect, send subscription commands, decode inbound frames, and report
//! connection state transitions. Transport failures drive the reconnect
//! state machine; they are never surfaced to consumers as stream errors.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──upgrade ok──► Connected
//!        ▲                        ▲  │                       │
//!        │                 delay  │  │ upgrade err           │ transport err
//!   disconnect()                  │  ▼                       ▼
//!        └──────────────────── Reconnecting ◄────────────────┘
//!                                  │ attempts exhausted
//!                                  ▼
//!                                Failed  (terminal until connect())
//! ```
//!
//! On every entry into `Connected` the client re-issues one batched
//! subscribe for the subscription manager's full current interest — the
//! server holds no subscription state across reconnects. Commands issued
//! while not connected are coalesced into that batch rather than replayed
//! individually.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{CommandMessage, StreamMessage};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::price::{CoinId, PriceTick};
use crate::domain::subscription::SubscriptionManager;

/// Connection lifecycle state, owned exclusively by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Live connection; updates are flowing.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Reconnect attempts exhausted; only an explicit `connect()` restarts.
    Failed,
}

impl ConnectionState {
    /// Short name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the streaming client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// Connection-level failure with context.
    #[error("stream connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server closed the connection or the heartbeat timed out.
    #[error("connection closed")]
    ConnectionClosed,

    /// `run()` was called more than once.
    #[error("client run loop already started")]
    AlreadyRunning,
}

/// Lifecycle commands accepted by the run loop.
#[derive(Debug, Clone)]
enum StreamCommand {
    Connect,
    Disconnect,
    Subscribe(Vec<CoinId>),
    Unsubscribe(Vec<CoinId>),
}

/// How a live session ended.
enum SessionExit {
    /// User-initiated close; return to `Disconnected` without reconnecting.
    Disconnect,
    /// Client cancelled; tear everything down.
    Cancelled,
}

/// Configuration for the streaming client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL of the streaming endpoint.
    pub url: String,
    /// Reconnection policy configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl StreamClientConfig {
    /// Configuration with default reconnect and heartbeat behavior.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// WebSocket client for the price stream.
///
/// Construct once per process, spawn [`run`](Self::run), then drive it with
/// [`connect`](Self::connect) / [`disconnect`](Self::disconnect) and the
/// subscription methods. Decoded ticks flow out over the update channel;
/// every state transition is stored in the snapshot and broadcast.
pub struct StreamClient {
    config: StreamClientConfig,
    codec: JsonCodec,
    interest: Arc<SubscriptionManager>,
    update_tx: mpsc::Sender<PriceTick>,
    state_tx: broadcast::Sender<ConnectionState>,
    state: RwLock<ConnectionState>,
    command_tx: mpsc::UnboundedSender<StreamCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<StreamCommand>>>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create a new client.
    ///
    /// `interest` supplies the full set to re-subscribe after every
    /// reconnect; `update_tx` carries decoded ticks to the repository;
    /// `state_tx` publishes every state transition.
    #[must_use]
    pub fn new(
        config: StreamClientConfig,
        interest: Arc<SubscriptionManager>,
        update_tx: mpsc::Sender<PriceTick>,
        state_tx: broadcast::Sender<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            codec: JsonCodec::new(),
            interest,
            update_tx,
            state_tx,
            state: RwLock::new(ConnectionState::Disconnected),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            cancel,
        }
    }

    /// Begin the handshake. Idempotent while connecting or connected; from
    /// `Failed` it resets the backoff policy and starts over.
    pub fn connect(&self) {
        let _ = self.command_tx.send(StreamCommand::Connect);
    }

    /// User-initiated close. Cancels any pending reconnect timer.
    pub fn disconnect(&self) {
        let _ = self.command_tx.send(StreamCommand::Disconnect);
    }

    /// Request streaming for additional coins.
    ///
    /// While not connected this is a buffered no-op: the post-connect batch
    /// subscribe carries the net interest set.
    pub fn subscribe(&self, coin_ids: Vec<CoinId>) {
        let _ = self.command_tx.send(StreamCommand::Subscribe(coin_ids));
    }

    /// Stop streaming the given coins.
    pub fn unsubscribe(&self, coin_ids: Vec<CoinId>) {
        let _ = self.command_tx.send(StreamCommand::Unsubscribe(coin_ids));
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Store and publish a state transition.
    fn set_state(&self, next: ConnectionState) {
        *self.state.write() = next;
        tracing::debug!(state = %next, "stream state transition");
        let _ = self.state_tx.send(next);
    }

    /// Run the client until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error only if called more than once; every transport
    /// failure is handled internally by the reconnect machine.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamClientError> {
        let mut commands = self
            .command_rx
            .lock()
            .take()
            .ok_or(StreamClientError::AlreadyRunning)?;
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        // Idle loop: Disconnected or Failed, waiting for connect().
        loop {
            let command = tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => return Ok(()),
                },
            };

            match command {
                StreamCommand::Connect => {}
                // Interest changes while offline are tracked by the manager
                // and flushed by the post-connect batch subscribe.
                StreamCommand::Disconnect
                | StreamCommand::Subscribe(_)
                | StreamCommand::Unsubscribe(_) => continue,
            }

            policy.reset();

            if !self.connect_cycle(&mut commands, &mut policy).await {
                return Ok(());
            }
        }
    }

    /// Drive connect attempts until the session ends for good.
    ///
    /// Returns `false` when the client was cancelled.
    async fn connect_cycle(
        &self,
        commands: &mut mpsc::UnboundedReceiver<StreamCommand>,
        policy: &mut ReconnectPolicy,
    ) -> bool {
        loop {
            self.set_state(ConnectionState::Connecting);
            tracing::info!(url = %self.config.url, "connecting to price stream");

            let session = match tokio_tungstenite::connect_async(&self.config.url).await {
                Ok((ws, _response)) => {
                    policy.reset();
                    self.set_state(ConnectionState::Connected);
                    self.run_session(ws, commands).await
                }
                Err(e) => Err(StreamClientError::WebSocket(e)),
            };

            match session {
                Ok(SessionExit::Disconnect) => {
                    tracing::info!("price stream closed by request");
                    self.set_state(ConnectionState::Disconnected);
                    return true;
                }
                Ok(SessionExit::Cancelled) => return false,
                Err(e) => {
                    tracing::warn!(error = %e, "price stream connection error");

                    let Some(delay) = policy.next_delay() else {
                        tracing::error!(
                            attempts = policy.attempt_count(),
                            "reconnect attempts exhausted, stream failed"
                        );
                        self.set_state(ConnectionState::Failed);
                        return true;
                    };

                    self.set_state(ConnectionState::Reconnecting);
                    tracing::info!(
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "reconnecting to price stream"
                    );

                    if !self.await_reconnect_delay(delay, commands).await {
                        return true;
                    }
                    if self.cancel.is_cancelled() {
                        return false;
                    }
                }
            }
        }
    }

    /// Sleep out the backoff delay, still servicing lifecycle commands.
    ///
    /// Returns `false` when the cycle should end (user disconnect); an
    /// explicit `connect()` skips the remaining delay.
    async fn await_reconnect_delay(
        &self,
        delay: std::time::Duration,
        commands: &mut mpsc::UnboundedReceiver<StreamCommand>,
    ) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return true,
                () = &mut sleep => return true,
                command = commands.recv() => match command {
                    Some(StreamCommand::Disconnect) => {
                        tracing::info!("reconnect cancelled by disconnect");
                        self.set_state(ConnectionState::Disconnected);
                        return false;
                    }
                    // Explicit connect: retry now instead of waiting.
                    Some(StreamCommand::Connect) => return true,
                    // Coalesced into the post-connect batch subscribe.
                    Some(_) => {}
                    None => return true,
                },
            }
        }
    }

    /// Process one live connection until it ends.
    async fn run_session(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        commands: &mut mpsc::UnboundedReceiver<StreamCommand>,
    ) -> Result<SessionExit, StreamClientError> {
        let (mut write, mut read) = ws.split();

        // The server holds no subscription state across reconnects:
        // re-issue the full current interest in one batch.
        let interest = self.interest.current_interest();
        if !interest.is_empty() {
            self.send_command(&mut write, &CommandMessage::subscribe(interest))
                .await?;
        }

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let heartbeat = HeartbeatManager::new(
            self.config.heartbeat.clone(),
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel.clone(),
        );
        let _heartbeat_handle = tokio::spawn(heartbeat.run());

        let exit = loop {
            tokio::select! {
                () = self.cancel.cancelled() => break Ok(SessionExit::Cancelled),
                event = heartbeat_rx.recv() => match event {
                    Some(HeartbeatEvent::SendPing) => {
                        heartbeat_state.mark_ping_sent();
                        if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                            break Err(e.into());
                        }
                    }
                    Some(HeartbeatEvent::Timeout) => {
                        break Err(StreamClientError::ConnectionClosed);
                    }
                    None => {}
                },
                command = commands.recv() => match command {
                    Some(StreamCommand::Subscribe(coins)) => {
                        if !coins.is_empty()
                            && let Err(e) = self
                                .send_command(&mut write, &CommandMessage::subscribe(coins))
                                .await
                        {
                            break Err(e);
                        }
                    }
                    Some(StreamCommand::Unsubscribe(coins)) => {
                        if !coins.is_empty()
                            && let Err(e) = self
                                .send_command(&mut write, &CommandMessage::unsubscribe(coins))
                                .await
                        {
                            break Err(e);
                        }
                    }
                    // Already connected.
                    Some(StreamCommand::Connect) => {}
                    Some(StreamCommand::Disconnect) => {
                        let _ = write.send(Message::Close(None)).await;
                        break Ok(SessionExit::Disconnect);
                    }
                    None => break Ok(SessionExit::Cancelled),
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Any server traffic counts as liveness.
                        heartbeat_state.record_pong();
                        self.handle_frame(&text).await;
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat_state.record_pong(),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            break Err(e.into());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("server sent close frame");
                        break Err(StreamClientError::ConnectionClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Err(StreamClientError::ConnectionClosed),
                },
            }
        };

        heartbeat_cancel.cancel();
        exit
    }

    /// Decode a text frame and dispatch its messages.
    ///
    /// Malformed frames are dropped and logged; they never tear down the
    /// connection.
    async fn handle_frame(&self, text: &str) {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed stream frame");
                return;
            }
        };

        for message in messages {
            match message {
                StreamMessage::Ticker(ticker) => {
                    if self.update_tx.send(ticker.into_tick()).await.is_err() {
                        tracing::debug!("update channel closed");
                    }
                }
                StreamMessage::Subscribed(ack) => {
                    tracing::debug!(coins = ack.coin_ids.len(), "subscription confirmed");
                }
                // A rejection is a no-op: interest state is kept and re-sent
                // on the next reconnect.
                StreamMessage::Error(error) => {
                    tracing::warn!(code = error.code, msg = %error.msg, "server rejected command");
                }
            }
        }
    }

    /// Serialize and send a command frame.
    async fn send_command<W>(
        &self,
        write: &mut W,
        command: &CommandMessage,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = self.codec.encode(command).map_err(|e| {
            StreamClientError::ConnectionFailed(format!("failed to serialize command: {e}"))
        })?;

        tracing::debug!(action = ?command.action, coins = command.coin_ids.len(), "sending command");

        write.send(Message::Text(json.into())).await.map_err(|e| {
            StreamClientError::ConnectionFailed(format!("failed to send command: {e}"))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_client() -> (Arc<StreamClient>, broadcast::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = broadcast::channel(16);
        let (update_tx, _update_rx) = mpsc::channel(16);
        let client = Arc::new(StreamClient::new(
            StreamClientConfig::new("ws://127.0.0.1:1"),
            Arc::new(SubscriptionManager::new()),
            update_tx,
            state_tx,
            CancellationToken::new(),
        ));
        (client, state_rx)
    }

    #[test]
    fn initial_state_is_disconnected() {
        let (client, _state_rx) = make_client();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn set_state_updates_snapshot_and_broadcasts() {
        let (client, mut state_rx) = make_client();

        client.set_state(ConnectionState::Connecting);

        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(state_rx.try_recv().unwrap(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn run_twice_is_an_error() {
        let (client, _state_rx) = make_client();

        let first = Arc::clone(&client);
        let handle = tokio::spawn(async move { first.run().await });
        tokio::task::yield_now().await;

        let second = Arc::clone(&client).run().await;
        assert!(matches!(second, Err(StreamClientError::AlreadyRunning)));

        handle.abort();
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
