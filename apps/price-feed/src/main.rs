//! Price Feed Binary
//!
//! Starts the live price feed and logs every update until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p price-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_FEED_WS_URL`: WebSocket URL of the streaming endpoint
//! - `PRICE_FEED_REST_URL`: Base URL of the REST polling endpoint
//!
//! ## Optional
//! - `PRICE_FEED_COINS`: Comma-separated coin ids (default: bitcoin,ethereum)
//! - `PRICE_FEED_POLL_INTERVAL_SECS`: Fallback poll cadence (default: 10)
//! - `PRICE_FEED_MAX_RECONNECT_ATTEMPTS`: Attempt ceiling, 0 = unlimited
//! - `PRICE_FEED_RECONNECT_DELAY_INITIAL_MS` / `PRICE_FEED_RECONNECT_DELAY_MAX_SECS`
//! - `RUST_LOG`: Log level (default: info,price_feed=debug)

use std::sync::Arc;

use price_feed::{
    FallbackPoller, FeedConfig, FeedHub, ObservePriceUpdates, PriceRepository, RestPriceSource,
    StreamClient, SubscriptionManager,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();
    price_feed::init_telemetry();

    tracing::info!("Starting price feed");

    let config = FeedConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let hub = Arc::new(FeedHub::new(price_feed::HubConfig {
        update_capacity: config.hub.update_capacity,
        state_capacity: config.hub.state_capacity,
    }));
    let interest = Arc::new(SubscriptionManager::new());

    let (stream_tx, stream_rx) = mpsc::channel(1024);
    let (poll_tx, poll_rx) = mpsc::channel(256);

    let stream_client = Arc::new(StreamClient::new(
        config.stream_client_config(),
        Arc::clone(&interest),
        stream_tx,
        hub.state_sender(),
        shutdown_token.clone(),
    ));

    let price_source = Arc::new(RestPriceSource::new(config.rest_url.clone())?);
    let poller = Arc::new(FallbackPoller::new(
        config.poller_config(),
        price_source,
        Arc::clone(&interest),
        poll_tx,
    ));

    let repository = Arc::new(PriceRepository::new(
        interest,
        Arc::clone(&stream_client),
        poller,
        hub,
        stream_rx,
        poll_rx,
        shutdown_token.clone(),
    ));

    // Spawn the stream run loop and the merge loop.
    let client_task = Arc::clone(&stream_client);
    tokio::spawn(async move {
        if let Err(e) = client_task.run().await {
            tracing::error!(error = %e, "stream client error");
        }
    });

    let merge_task = Arc::clone(&repository);
    tokio::spawn(async move {
        if let Err(e) = merge_task.run().await {
            tracing::error!(error = %e, "repository merge loop error");
        }
    });

    // Subscribe this process as consumer 1 and start streaming.
    let observe = ObservePriceUpdates::new(Arc::clone(&repository));
    let subscription = observe.subscribe(1, &config.coins);
    let handle = subscription.handle.clone();
    stream_client.connect();

    // Log the merged feed and state transitions until shutdown.
    let mut updates = subscription.updates;
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => tracing::info!(
                    coin = %update.coin_id,
                    price = %update.price,
                    direction = ?update.direction,
                    source = ?update.source,
                    "price update"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "update logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    let mut states = subscription.states;
    tokio::spawn(async move {
        while let Ok(state) = states.recv().await {
            tracing::info!(state = %state, "connection state");
        }
    });

    tracing::info!(coins = config.coins.len(), "price feed ready");

    await_shutdown().await;

    observe.release(&handle);
    repository.shutdown();

    tracing::info!("Price feed stopped");
    Ok(())
}

/// Load .env from the current directory or any ancestor.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        ws_url = %config.ws_url,
        rest_url = %config.rest_url,
        coins = ?config.coins,
        poll_interval_secs = config.poller.interval.as_secs(),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Configuration loaded"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
