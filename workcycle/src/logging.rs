//! Development-time tracing.
//!
//! Tracing goes to stderr only and is controlled by `RUST_LOG`. Product
//! output (step ids, hook decisions, completion summaries) goes to stdout and
//! is unaffected by the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=workcycle=debug workcycle done gt-abc --exit COMPLETED --actor gastown/polecats/nux
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
