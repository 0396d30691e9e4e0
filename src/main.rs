//! pollwatch: print filesystem changes as JSON lines.
//!
//! Thin binary entry point. All logic lives in the `pollwatch-core` crate.
//!
//! ```text
//! pollwatch [PATH]...
//! ```
//!
//! Every path is watched recursively (default: the current directory).
//! Configuration is read from the JSON file named by `POLLWATCH_CONFIG`;
//! `POLLWATCH_INTERVAL_MS` overrides the poll interval.

mod logging;

use anyhow::{bail, Context};
use pollwatch_core::{WatchConfig, Watcher};
use std::io::Write;
use std::path::PathBuf;
use std::thread;

const CONFIG_ENV: &str = "POLLWATCH_CONFIG";
const INTERVAL_ENV: &str = "POLLWATCH_INTERVAL_MS";

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    tracing::info!("pollwatch starting");

    let config = load_config()?;
    let watcher = Watcher::with_config(config);

    let mut paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        paths.push(PathBuf::from("."));
    }
    for path in &paths {
        watcher
            .add_recursive(path)
            .with_context(|| format!("cannot watch {}", path.display()))?;
    }
    tracing::info!(
        "Watching {} roots ({} entries)",
        paths.len(),
        watcher.watched_files().len()
    );

    let events = watcher.events();
    let errors = watcher.errors();
    let handle = watcher.spawn(watcher.config().poll_interval())?;

    let error_thread = thread::Builder::new()
        .name("pollwatch-errors".into())
        .spawn(move || {
            for err in errors.iter() {
                if err.is_transient() {
                    tracing::warn!("{err}");
                } else {
                    tracing::error!("{err}");
                }
            }
        })?;

    let stdout = std::io::stdout();
    for event in events.iter() {
        let line = serde_json::to_string(&event)?;
        let mut out = stdout.lock();
        if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
            // Downstream closed the pipe.
            handle.stop();
            break;
        }
    }

    let result = handle.join();
    let _ = error_thread.join();
    result?;
    Ok(())
}

/// Defaults, overlaid by the optional JSON file, overlaid by the interval
/// environment variable.
fn load_config() -> anyhow::Result<WatchConfig> {
    let mut config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => WatchConfig::default(),
    };

    if let Ok(raw) = std::env::var(INTERVAL_ENV) {
        let ms: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{INTERVAL_ENV} must be a number of milliseconds"))?;
        if ms == 0 {
            bail!("{INTERVAL_ENV} must be greater than zero");
        }
        config.poll_interval_ms = ms;
    }

    Ok(config)
}
