//! REST Price Source
//!
//! `reqwest` adapter implementing the [`PriceSource`] port against the
//! price API's request/response endpoint.
//!
//! # Endpoints
//!
//! - Batch: `GET {base}/prices?ids=bitcoin,ethereum`
//! - Single: `GET {base}/prices/{coin_id}`
//!
//! # Response Shape
//!
//! ```json
//! {"data": [{"coinId": "bitcoin", "price": "97123.45",
//!            "timestamp": "2026-08-05T12:00:00Z"}]}
//! ```
//!
//! Malformed rows are skipped individually; only a malformed envelope or a
//! failed request is an error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::price::{CoinId, PriceTick, UpdateSource};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One price row in an API response.
#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(rename = "coinId")]
    coin_id: CoinId,
    price: Decimal,
    timestamp: DateTime<Utc>,
}

impl PriceRow {
    fn into_tick(self) -> PriceTick {
        PriceTick {
            coin_id: self.coin_id,
            price: self.price,
            timestamp: self.timestamp,
            source: UpdateSource::Poll,
        }
    }
}

/// Batch response envelope.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    data: Vec<serde_json::Value>,
}

/// Single-coin response envelope.
#[derive(Debug, Deserialize)]
struct SingleResponse {
    data: PriceRow,
}

/// REST adapter for the polling price endpoint.
pub struct RestPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl RestPriceSource {
    /// Create a source against the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, PriceSourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PriceSourceError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Parse one response row, skipping it on shape mismatch.
    fn parse_row(value: serde_json::Value) -> Option<PriceTick> {
        match serde_json::from_value::<PriceRow>(value) {
            Ok(row) => Some(row.into_tick()),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed price row");
                None
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, PriceSourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| PriceSourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceSourceError::Request(format!("HTTP {status} from {url}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PriceSourceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PriceSource for RestPriceSource {
    fn supports_batching(&self) -> bool {
        true
    }

    async fn fetch_price(&self, coin_id: &str) -> Result<PriceTick, PriceSourceError> {
        let url = format!("{}/prices/{coin_id}", self.base_url);
        let response: SingleResponse = self.get_json(&url, &[]).await?;
        Ok(response.data.into_tick())
    }

    async fn fetch_prices(&self, coin_ids: &[CoinId]) -> Result<Vec<PriceTick>, PriceSourceError> {
        let url = format!("{}/prices", self.base_url);
        let response: BatchResponse = self
            .get_json(&url, &[("ids", coin_ids.join(","))])
            .await?;

        Ok(response
            .data
            .into_iter()
            .filter_map(Self::parse_row)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let source = RestPriceSource::new("https://api.example.com/").unwrap();
        assert_eq!(source.base_url, "https://api.example.com");
    }

    #[test]
    fn parse_row_accepts_well_formed_rows() {
        let tick = RestPriceSource::parse_row(json!({
            "coinId": "bitcoin",
            "price": "97123.45",
            "timestamp": "2026-08-05T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(tick.coin_id, "bitcoin");
        assert_eq!(tick.price, Decimal::new(9_712_345, 2));
        assert_eq!(tick.source, UpdateSource::Poll);
    }

    #[test]
    fn parse_row_skips_missing_fields() {
        assert!(RestPriceSource::parse_row(json!({"coinId": "bitcoin"})).is_none());
    }

    #[test]
    fn parse_row_skips_unparseable_price() {
        assert!(
            RestPriceSource::parse_row(json!({
                "coinId": "bitcoin",
                "price": "not-a-number",
                "timestamp": "2026-08-05T12:00:00Z"
            }))
            .is_none()
        );
    }

    #[test]
    fn batch_envelope_tolerates_mixed_rows() {
        let envelope: BatchResponse = serde_json::from_value(json!({
            "data": [
                {"coinId": "bitcoin", "price": "100", "timestamp": "2026-08-05T12:00:00Z"},
                {"garbage": true}
            ]
        }))
        .unwrap();

        let ticks: Vec<_> = envelope
            .data
            .into_iter()
            .filter_map(RestPriceSource::parse_row)
            .collect();

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].coin_id, "bitcoin");
    }
}
