//! Feed Composition
//!
//! The price repository (merge, dedupe, direction tagging, poller
//! engagement) and the broadcast hub it publishes through.

pub mod hub;
pub mod repository;

pub use hub::{FeedHub, HubConfig};
pub use repository::{FeedError, PriceRepository};
