//! Streaming Adapter
//!
//! WebSocket client for the price-streaming endpoint:
//!
//! - **messages**: wire format types (commands, tickers, acks, errors)
//! - **codec**: tolerant JSON decoding
//! - **reconnect**: exponential backoff with jitter
//! - **heartbeat**: ping/pong liveness monitoring
//! - **client**: connection state machine and run loop

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;

pub use client::{ConnectionState, StreamClient, StreamClientConfig, StreamClientError};
pub use codec::{CodecError, JsonCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{
    CommandAction, CommandMessage, ErrorMessage, StreamMessage, SubscribedMessage, TickerMessage,
};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
