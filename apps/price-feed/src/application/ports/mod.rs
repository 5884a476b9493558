//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement, following the
//! Hexagonal Architecture pattern.
//!
//! The only driven port of this core is [`PriceSource`]: the
//! request/response channel the fallback poller fetches prices through
//! while the streaming connection is down.

use async_trait::async_trait;

use crate::domain::price::{CoinId, PriceTick};

/// Errors a price source can report.
///
/// The poller treats every variant the same way: log, skip the cycle (or
/// the single coin), and retry on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    /// The request could not be completed (network, HTTP status).
    #[error("price request failed: {0}")]
    Request(String),

    /// The response body could not be interpreted.
    #[error("malformed price response: {0}")]
    Decode(String),
}

/// A request/response source of current prices.
///
/// Implementations report whether they can serve several coins in one
/// request; the poller batches when they can and fans out with bounded
/// concurrency when they cannot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Whether [`fetch_prices`](Self::fetch_prices) serves a whole interest
    /// set in one request.
    fn supports_batching(&self) -> bool {
        true
    }

    /// Fetch the current price of a single coin.
    async fn fetch_price(&self, coin_id: &str) -> Result<PriceTick, PriceSourceError>;

    /// Fetch current prices for a set of coins in one request.
    ///
    /// Implementations may return fewer ticks than requested; unknown coins
    /// and malformed rows are skipped, not errors.
    async fn fetch_prices(&self, coin_ids: &[CoinId]) -> Result<Vec<PriceTick>, PriceSourceError>;
}
