#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Price Feed - Live Coin Price Delivery
//!
//! Keeps a set of interesting coin ids continuously fed with live price
//! updates: one WebSocket connection to the streaming endpoint, multiplexed
//! across all in-process consumers, with periodic REST polling as the
//! safety net while the stream is down.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and logic
//!   - `price`: price updates, direction derivation, monotonicity ledger
//!   - `subscription`: reference-counted consumer interest
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: the polling price-source contract
//!   - `observe`: the consumer-facing façade
//!
//! - **Infrastructure**: Adapters
//!   - `stream`: WebSocket client (codec, reconnect, heartbeat)
//!   - `poller`: fallback REST poller
//!   - `feed`: price repository and broadcast hub
//!   - `config`: environment configuration
//!   - `telemetry`: tracing initialization
//!
//! # Data Flow
//!
//! ```text
//! Price stream WS ──┐
//!                   │    ┌──────────────────┐     ┌──────────┐
//!                   ├───►│ PriceRepository  │────►│ FeedHub  │──► Consumer 1
//! REST poller ──────┘    │ (merge + dedupe  │     │(broadcast│──► Consumer 2
//!   (fallback)           │  + direction)    │     │ channels)│──► Consumer N
//!                        └──────────────────┘     └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price and subscription types, no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::price::{CoinId, PriceBook, PriceDirection, PriceTick, PriceUpdate, UpdateSource};
pub use domain::subscription::{
    ConsumerId, InterestChanges, InterestHandle, InterestStats, SubscriptionManager,
};

// Application surface
pub use application::observe::{ObservePriceUpdates, PriceFeedSubscription};
pub use application::ports::{PriceSource, PriceSourceError};

// Streaming client
pub use infrastructure::stream::{
    ConnectionState, HeartbeatConfig, ReconnectConfig, ReconnectPolicy, StreamClient,
    StreamClientConfig, StreamClientError,
};

// Fallback poller
pub use infrastructure::poller::{FallbackPoller, PollerConfig, RestPriceSource};

// Feed composition
pub use infrastructure::feed::{FeedError, FeedHub, HubConfig, PriceRepository};

// Configuration
pub use infrastructure::config::{ConfigError, FeedConfig};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
