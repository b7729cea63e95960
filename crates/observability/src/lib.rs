//! Process-wide tracing setup for courier services and workers.

/// Subscriber configuration and installation.
pub mod subscriber;

pub use subscriber::{LogFormat, ObservabilityConfig};

/// Install the default subscriber: JSON lines, `RUST_LOG` filter, `info` fallback.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init_with(&ObservabilityConfig::default());
}

/// Install a subscriber built from `config`.
pub fn init_with(config: &ObservabilityConfig) {
    subscriber::init_with(config);
}
