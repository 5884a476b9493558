//! Feed Configuration Settings
//!
//! Configuration types for the price feed, loaded from environment
//! variables with the `PRICE_FEED_` prefix.

use std::time::Duration;

use crate::domain::price::CoinId;
use crate::infrastructure::poller::PollerConfig;
use crate::infrastructure::stream::{HeartbeatConfig, ReconnectConfig, StreamClientConfig};

/// Streaming connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before the connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to reconnect delays.
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before the stream fails (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(40),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.2,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl StreamSettings {
    /// Reconnection policy configuration derived from these settings.
    #[must_use]
    pub const fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: self.reconnect_delay_initial,
            max_delay: self.reconnect_delay_max,
            multiplier: self.reconnect_delay_multiplier,
            jitter_factor: self.reconnect_jitter,
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Heartbeat configuration derived from these settings.
    #[must_use]
    pub const fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: self.heartbeat_interval,
            pong_timeout: self.heartbeat_timeout,
        }
    }
}

/// Fallback poller settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Time between poll cycles.
    pub interval: Duration,
    /// Concurrent per-coin requests when the source cannot batch.
    pub max_concurrency: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_concurrency: 4,
        }
    }
}

/// Broadcast hub settings.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Capacity of the price update channel.
    pub update_capacity: usize,
    /// Capacity of the connection state channel.
    pub state_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            update_capacity: 4_096,
            state_capacity: 64,
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL of the streaming endpoint.
    pub ws_url: String,
    /// Base URL of the REST polling endpoint.
    pub rest_url: String,
    /// Coins the binary subscribes to at startup.
    pub coins: Vec<CoinId>,
    /// Streaming connection settings.
    pub stream: StreamSettings,
    /// Fallback poller settings.
    pub poller: PollerSettings,
    /// Broadcast hub settings.
    pub hub: HubSettings,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required environment variable is missing or
    /// empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_url = require_env("PRICE_FEED_WS_URL")?;
        let rest_url = require_env("PRICE_FEED_REST_URL")?;

        let coins = std::env::var("PRICE_FEED_COINS")
            .unwrap_or_else(|_| "bitcoin,ethereum".to_string())
            .split(',')
            .map(str::trim)
            .filter(|coin| !coin.is_empty())
            .map(str::to_string)
            .collect();

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            heartbeat_interval: parse_env_duration_secs(
                "PRICE_FEED_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "PRICE_FEED_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "PRICE_FEED_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "PRICE_FEED_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "PRICE_FEED_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_env_f64("PRICE_FEED_RECONNECT_JITTER", defaults.reconnect_jitter),
            max_reconnect_attempts: parse_env_u32(
                "PRICE_FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let poller_defaults = PollerSettings::default();
        let poller = PollerSettings {
            interval: parse_env_duration_secs(
                "PRICE_FEED_POLL_INTERVAL_SECS",
                poller_defaults.interval,
            ),
            max_concurrency: parse_env_usize(
                "PRICE_FEED_POLL_MAX_CONCURRENCY",
                poller_defaults.max_concurrency,
            ),
        };

        let hub_defaults = HubSettings::default();
        let hub = HubSettings {
            update_capacity: parse_env_usize(
                "PRICE_FEED_UPDATE_CAPACITY",
                hub_defaults.update_capacity,
            ),
            state_capacity: parse_env_usize(
                "PRICE_FEED_STATE_CAPACITY",
                hub_defaults.state_capacity,
            ),
        };

        Ok(Self {
            ws_url,
            rest_url,
            coins,
            stream,
            poller,
            hub,
        })
    }

    /// Streaming client configuration derived from this config.
    #[must_use]
    pub fn stream_client_config(&self) -> StreamClientConfig {
        StreamClientConfig {
            url: self.ws_url.clone(),
            reconnect: self.stream.reconnect_config(),
            heartbeat: self.stream.heartbeat_config(),
        }
    }

    /// Poller configuration derived from this config.
    #[must_use]
    pub const fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poller.interval,
            max_concurrency: self.poller.max_concurrency,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    let value =
        std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
