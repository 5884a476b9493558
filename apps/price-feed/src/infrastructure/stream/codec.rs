//! Stream Codec
//!
//! Tolerant JSON decoding for the price-streaming endpoint. Frames arrive as
//! a single object or an array of objects; each element carries a `type`
//! discriminator. Elements with an unrecognized `type` are skipped, so
//! protocol additions never tear down the connection; elements of a known
//! type but broken shape surface as a [`CodecError`] for the caller to drop
//! and log.

use crate::infrastructure::stream::messages::{
    ErrorMessage, StreamMessage, SubscribedMessage, TickerMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was valid JSON but not an object or array of objects.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the streaming protocol.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into zero or more messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON, is not an object or
    /// array, or a known-type element has a broken shape.
    pub fn decode(&self, text: &str) -> Result<Vec<StreamMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
            let mut messages = Vec::with_capacity(values.len());
            for value in values {
                if let Some(msg) = Self::decode_value(value)? {
                    messages.push(msg);
                }
            }
            Ok(messages)
        } else if trimmed.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(trimmed)?;
            Ok(Self::decode_value(value)?.into_iter().collect())
        } else {
            Err(CodecError::InvalidFormat(format!(
                "expected JSON object or array, got: {}",
                &trimmed[..trimmed.len().min(40)]
            )))
        }
    }

    /// Decode one element; `None` for unrecognized types.
    fn decode_value(value: serde_json::Value) -> Result<Option<StreamMessage>, CodecError> {
        let msg_type = value.get("type").and_then(|v| v.as_str());

        let message = match msg_type {
            Some("ticker") => {
                let m: TickerMessage = serde_json::from_value(value)?;
                Some(StreamMessage::Ticker(m))
            }
            Some("subscribed" | "unsubscribed") => {
                let m: SubscribedMessage = serde_json::from_value(value)?;
                Some(StreamMessage::Subscribed(m))
            }
            Some("error") => {
                let m: ErrorMessage = serde_json::from_value(value)?;
                Some(StreamMessage::Error(m))
            }
            // Unknown or absent type: ignore, per protocol contract.
            _ => None,
        };

        Ok(message)
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
