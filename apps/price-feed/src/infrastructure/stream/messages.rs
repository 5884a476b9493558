//! Streaming Protocol Message Types
//!
//! Wire format types for the price-streaming WebSocket endpoint.
//!
//! # Message Types
//!
//! ## Outbound
//! - `Command`: subscribe/unsubscribe for a batch of coin ids
//!
//! ## Inbound
//! - `Ticker`: a live price observation
//! - `Subscribed`: acknowledgment carrying the server-side active set
//! - `Error`: server rejection with code and message
//!
//! Messages of unrecognized type or shape are ignored by the codec.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::price::{CoinId, PriceTick, UpdateSource};

/// Action carried by an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandAction {
    /// Start streaming the listed coins.
    Subscribe,
    /// Stop streaming the listed coins.
    Unsubscribe,
}

/// Outbound subscription command.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "coinIds": ["bitcoin", "ethereum"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Whether to subscribe or unsubscribe.
    pub action: CommandAction,

    /// Coins the command applies to.
    #[serde(rename = "coinIds")]
    pub coin_ids: Vec<CoinId>,
}

impl CommandMessage {
    /// A subscribe command for the given coins.
    #[must_use]
    pub fn subscribe(coin_ids: Vec<CoinId>) -> Self {
        Self {
            action: CommandAction::Subscribe,
            coin_ids,
        }
    }

    /// An unsubscribe command for the given coins.
    #[must_use]
    pub fn unsubscribe(coin_ids: Vec<CoinId>) -> Self {
        Self {
            action: CommandAction::Unsubscribe,
            coin_ids,
        }
    }
}

/// Live price observation pushed by the server.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "type": "ticker",
///   "coinId": "bitcoin",
///   "price": "97123.45",
///   "timestamp": "2026-08-05T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMessage {
    /// Message type (always "ticker").
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Coin the price belongs to.
    #[serde(rename = "coinId")]
    pub coin_id: CoinId,

    /// Observed price.
    pub price: Decimal,

    /// Server-side observation time.
    pub timestamp: DateTime<Utc>,
}

impl TickerMessage {
    /// Convert into the domain tick, tagged as stream-sourced.
    #[must_use]
    pub fn into_tick(self) -> PriceTick {
        PriceTick {
            coin_id: self.coin_id,
            price: self.price,
            timestamp: self.timestamp,
            source: UpdateSource::Stream,
        }
    }
}

/// Acknowledgment of a subscription command.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribed", "coinIds": ["bitcoin", "ethereum"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedMessage {
    /// Message type (always "subscribed").
    #[serde(rename = "type")]
    pub msg_type: String,

    /// The server-side active set after the command.
    #[serde(rename = "coinIds", default)]
    pub coin_ids: Vec<CoinId>,
}

/// Server rejection of a command.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "error", "code": 400, "msg": "unknown coin id"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error").
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Error code.
    pub code: i32,

    /// Error description.
    pub msg: String,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Live price observation.
    Ticker(TickerMessage),
    /// Subscription acknowledgment.
    Subscribed(SubscribedMessage),
    /// Server rejection.
    Error(ErrorMessage),
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn command_serializes_with_camel_case_ids() {
        let cmd = CommandMessage::subscribe(vec!["bitcoin".to_string(), "ethereum".to_string()]);

        let json = serde_json::to_string(&cmd).unwrap();

        assert!(json.contains(r#""action":"subscribe""#));
        assert!(json.contains(r#""coinIds":["bitcoin","ethereum"]"#));
    }

    #[test]
    fn unsubscribe_action_round_trips() {
        let cmd = CommandMessage::unsubscribe(vec!["bitcoin".to_string()]);

        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: CommandMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.action, CommandAction::Unsubscribe);
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn ticker_parses_string_price() {
        let json = r#"{
            "type": "ticker",
            "coinId": "bitcoin",
            "price": "97123.45",
            "timestamp": "2026-08-05T12:00:00Z"
        }"#;

        let msg: TickerMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.coin_id, "bitcoin");
        assert_eq!(msg.price, Decimal::new(9_712_345, 2));
    }

    #[test]
    fn ticker_parses_numeric_price() {
        let json = r#"{"type":"ticker","coinId":"ethereum","price":3500.5,"timestamp":"2026-08-05T12:00:00Z"}"#;

        let msg: TickerMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.price, Decimal::new(35_005, 1));
    }

    #[test]
    fn ticker_converts_to_stream_tick() {
        let msg = TickerMessage {
            msg_type: "ticker".to_string(),
            coin_id: "bitcoin".to_string(),
            price: Decimal::from(100),
            timestamp: Utc.timestamp_opt(1, 0).unwrap(),
        };

        let tick = msg.into_tick();

        assert_eq!(tick.coin_id, "bitcoin");
        assert_eq!(tick.source, UpdateSource::Stream);
    }

    #[test]
    fn subscribed_ack_defaults_to_empty_set() {
        let msg: SubscribedMessage = serde_json::from_str(r#"{"type":"subscribed"}"#).unwrap();
        assert!(msg.coin_ids.is_empty());
    }
}
