//! Tracing setup for tests. Embedding binaries install their own
//! subscriber; the engine only emits `tracing` events.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TEST_FILTER: &str = "carousel_backend=debug";

/// Route engine logs to the test writer. `RUST_LOG` overrides the default
/// filter. Safe to call from many tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| TEST_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
