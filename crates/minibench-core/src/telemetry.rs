//! Tracing initialisation for minibench binaries.
//!
//! The filter comes from `MINIBENCH_LOG`, then `RUST_LOG`, then the level
//! passed in. Only the first successful call installs a subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "MINIBENCH_LOG";

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber, writing to stderr so stdout stays free
/// for command output.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = env_filter(level);
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .is_ok()
    }
}
