//! Tracing subscriber setup.
//!
//! The event loop reports accepted connections, decoded request lines and
//! closed connections through `tracing`. Nothing is printed until one of the
//! functions below installs a subscriber.
//!
//! The level is taken from `RUST_LOG` when set:
//!
//! ```bash
//! # Request lines and response statuses
//! RUST_LOG=edgeloop_core=debug edgeloop 8080
//!
//! # Only per-connection failures and fatal errors
//! RUST_LOG=warn edgeloop 8080
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Compact single-line output at `info` unless `RUST_LOG` says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber was already installed.
pub fn init_logging() {
    init_logging_with_level("info");
}

/// Like [`init_logging`] with a caller-chosen fallback level.
pub fn init_logging_with_level(level: &str) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Multi-line, human-oriented output with source locations.
pub fn init_logging_pretty() {
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_line_number(true)
                .with_target(true),
        )
        .init();
}

/// One JSON object per event, for log collectors.
pub fn init_logging_json() {
    tracing_subscriber::registry()
        .with(filter("info"))
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
