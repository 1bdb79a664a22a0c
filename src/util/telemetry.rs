//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "fleet_orchestrator=info";

/// Build the subscriber filter: `RUST_LOG` if it parses, else `fallback`.
pub fn env_filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install a fmt subscriber unless the host already set one.
///
/// Idempotent. Returns whether this call installed the subscriber.
pub fn init_tracing() -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter_or(DEFAULT_FILTER))
        .with_target(true)
        .try_init()
        .is_ok()
}
