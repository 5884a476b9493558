//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations behind the domain and port contracts.

/// WebSocket streaming client (codec, reconnect, heartbeat, state machine).
pub mod stream;

/// Fallback REST poller and its price-source adapter.
pub mod poller;

/// Price repository and broadcast hub.
pub mod feed;

/// Configuration loaded from environment variables.
pub mod config;

/// Tracing subscriber initialization.
pub mod telemetry;
