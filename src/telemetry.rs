//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber. The
//! library itself only emits events; embedding applications call [`init`]
//! if they do not install a subscriber of their own.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(default_level: &str) -> String {
    format!("switchyard={}", default_level)
}

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// Reads the filter from the RUST_LOG environment variable, defaulting to
/// `switchyard=<default_level>`.
///
/// # Examples
///
/// ```no_run
/// switchyard::telemetry::init("info");
/// tracing::info!("Router starting");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        // try_init: the host application may already own the global subscriber
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
