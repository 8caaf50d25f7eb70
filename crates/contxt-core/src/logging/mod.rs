//! Structured logging with `tracing`.
//!
//! Components never print directly; they emit `tracing` events with
//! structured fields (`conn_id`, `correlation_id`, `subscription_id`) and the
//! binary decides where those go by installing a subscriber once at startup.
//!
//! - [`init_subscriber`] installs a compact stderr subscriber
//! - [`capture_logs`] installs a thread-local in-memory subscriber for tests

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_twice_is_harmless() {
        init_subscriber("warn");
        init_subscriber("debug");
    }
}
