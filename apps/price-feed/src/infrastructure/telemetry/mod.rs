//! Tracing Initialization
//!
//! Configures the global tracing subscriber with an environment filter and
//! a compact fmt layer. `RUST_LOG` overrides the default directives.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter directives when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,price_feed=debug";

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests can
/// initialize freely.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
