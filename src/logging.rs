/// Logging setup for the `pollwatch` binary.
///
/// The level comes from `POLLWATCH_LOG` (`error`, `warn`, `info`, `debug`,
/// `trace`) and defaults to `info`. Logs go to stderr; stdout carries the
/// event stream only.
use tracing::Level;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "POLLWATCH_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging() {
    let level = std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(Level::INFO);

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
