/// Watcher configuration.
///
/// Every field has a default, so a JSON document only needs the keys it
/// wants to change:
///
/// ```json
/// { "poll_interval_ms": 250, "backpressure": "drop_newest" }
/// ```
use crate::events::Backpressure;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default depth of the event and error queues.
///
/// A consumer that falls this far behind makes the poll loop wait (or drop,
/// depending on [`Backpressure`]) rather than buffer without bound.
pub const EVENT_CHANNEL_CAPACITY: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Interval between ticks, in milliseconds.
    pub poll_interval_ms: u64,

    /// Queue depth for events and errors. `0` means unbounded.
    pub channel_capacity: usize,

    /// What the poll loop does when the event queue is full.
    pub backpressure: Backpressure,

    /// Upper bound on events published per tick; the rest are discarded and
    /// counted. `None` means no cap.
    pub max_events_per_tick: Option<usize>,

    /// Skip entries whose name starts with `.`.
    pub ignore_hidden: bool,

    /// Walk recursive roots with a rayon pool instead of serially.
    pub parallel_scan: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            channel_capacity: EVENT_CHANNEL_CAPACITY,
            backpressure: Backpressure::default(),
            max_events_per_tick: None,
            ignore_hidden: false,
            parallel_scan: false,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_backpressure(mut self, backpressure: Backpressure) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_max_events_per_tick(mut self, max: usize) -> Self {
        self.max_events_per_tick = Some(max);
        self
    }

    pub fn ignore_hidden(mut self) -> Self {
        self.ignore_hidden = true;
        self
    }

    pub fn parallel_scan(mut self) -> Self {
        self.parallel_scan = true;
        self
    }
}
