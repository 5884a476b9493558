//! Price Update Types
//!
//! Core domain types for live prices: the raw tick produced by either data
//! source, the consumer-facing update with its derived direction, and the
//! `PriceBook` ledger that enforces per-coin timestamp monotonicity.
//!
//! # Design
//!
//! Sources (stream decoder, fallback poller) produce [`PriceTick`]s with no
//! direction attached. The repository runs every tick through a [`PriceBook`],
//! which is the sole owner of last-known-price state: it rejects stale or
//! duplicate timestamps and derives the [`PriceDirection`] against the
//! previously accepted price.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque string key identifying a tradeable asset (e.g. `"bitcoin"`).
pub type CoinId = String;

/// Which data path produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    /// Pushed over the live streaming connection.
    Stream,
    /// Fetched by the fallback poller.
    Poll,
}

/// Movement of a price relative to the previously accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    /// New price is higher than the stored one.
    Up,
    /// New price is lower than the stored one.
    Down,
    /// Equal to the stored price, or no prior price exists.
    Unchanged,
}

/// A raw price observation from either source, before direction is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    /// Asset the price belongs to.
    pub coin_id: CoinId,
    /// Observed price. Negative prices are rejected by the book.
    pub price: Decimal,
    /// Source-supplied observation time.
    pub timestamp: DateTime<Utc>,
    /// Which data path produced the tick.
    pub source: UpdateSource,
}

/// A consumer-facing price update. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Asset the price belongs to.
    pub coin_id: CoinId,
    /// Accepted price.
    pub price: Decimal,
    /// Source-supplied observation time.
    pub timestamp: DateTime<Utc>,
    /// Movement relative to the previously accepted price.
    pub direction: PriceDirection,
    /// Which data path produced the update.
    pub source: UpdateSource,
}

/// Last accepted observation for a single coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PricePoint {
    price: Decimal,
    timestamp: DateTime<Utc>,
}

/// Ledger of the last accepted price per coin.
///
/// The book is the single place direction is computed. It accepts a tick only
/// when its timestamp is strictly newer than the stored one for that coin;
/// out-of-order and duplicate-timestamp ticks are rejected without altering
/// stored state.
#[derive(Debug, Default)]
pub struct PriceBook {
    last: HashMap<CoinId, PricePoint>,
}

impl PriceBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a tick, returning the update to emit or `None` when rejected.
    ///
    /// Rejection cases: negative price, or a timestamp not strictly newer
    /// than the last accepted one for the coin.
    pub fn apply(&mut self, tick: PriceTick) -> Option<PriceUpdate> {
        if tick.price < Decimal::ZERO {
            return None;
        }

        let direction = match self.last.get(&tick.coin_id) {
            Some(point) => {
                if tick.timestamp <= point.timestamp {
                    return None;
                }
                if tick.price > point.price {
                    PriceDirection::Up
                } else if tick.price < point.price {
                    PriceDirection::Down
                } else {
                    PriceDirection::Unchanged
                }
            }
            None => PriceDirection::Unchanged,
        };

        self.last.insert(
            tick.coin_id.clone(),
            PricePoint {
                price: tick.price,
                timestamp: tick.timestamp,
            },
        );

        Some(PriceUpdate {
            coin_id: tick.coin_id,
            price: tick.price,
            timestamp: tick.timestamp,
            direction,
            source: tick.source,
        })
    }

    /// Drop the stored state for a coin.
    ///
    /// Called when the last consumer interest in the coin is released, so a
    /// later re-subscription starts from `Unchanged` instead of a direction
    /// computed against a price from before the release.
    pub fn forget(&mut self, coin_id: &str) {
        self.last.remove(coin_id);
    }

    /// Number of coins with stored state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last.len()
    }

    /// Whether the book holds no state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
