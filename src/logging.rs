//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the `EnvFilter` directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("gaud_bridge={},warn", config.level)
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Logs go to stderr so translated payloads on stdout stay
/// machine-readable.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
