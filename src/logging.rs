//! Logging setup
//!
//! Installs a `tracing` subscriber writing to stderr. The filter is read from
//! `KEYSTONE_LOG` (falling back to `RUST_LOG`, then `info`).

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "KEYSTONE_LOG";

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed, in which case the
/// existing one keeps receiving events.
pub fn initialize_logging() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_twice() {
        initialize_logging();
        assert!(!initialize_logging());
    }
}
