//! Configuration
//!
//! Feed configuration loaded from environment variables.

pub mod settings;

pub use settings::{
    ConfigError, FeedConfig, HubSettings, PollerSettings, StreamSettings,
};
