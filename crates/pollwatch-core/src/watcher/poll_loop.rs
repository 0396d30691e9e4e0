/// The poll loop: a crossbeam ticker drives rebuild → diff → publish → swap.
///
/// Stopping is cooperative. The stop signal is only observed between ticks
/// (and while a blocked publish waits for queue space), so a tick that has
/// started always completes its rebuild and baseline swap.
use super::{PollState, Shared};
use crate::error::{Result, WatchError};
use crate::events::{Delivery, Publisher};
use crossbeam_channel::select;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a tick hands events to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Delivering {
    /// Follow the configured [`Backpressure`](crate::events::Backpressure).
    Policy,
    /// Never wait for queue space; overflow is dropped and counted. Used when
    /// the consumer may be the thread running the tick.
    Immediate,
}

/// How a tick ended.
pub(super) enum TickStatus {
    /// Keep going; carries the number of events published.
    Continue(usize),
    /// The watcher was closed while publishing.
    Stopped,
    /// The loop cannot continue.
    Fatal(String),
}

/// Tick every `interval` until stopped. The caller has already moved the
/// state to `Running`.
pub(super) fn run(shared: &Shared, interval: Duration) -> Result<()> {
    let Some(publisher) = shared.dispatcher.publisher() else {
        *shared.state.lock() = PollState::Stopped;
        return Err(WatchError::Closed);
    };

    info!("Poll loop started (interval {interval:?})");
    let ticker = crossbeam_channel::tick(interval);

    let result = loop {
        select! {
            recv(shared.stop_rx) -> _ => break Ok(()),
            recv(ticker) -> _ => match tick(shared, &publisher, Delivering::Policy) {
                TickStatus::Continue(_) => {}
                TickStatus::Stopped => break Ok(()),
                TickStatus::Fatal(message) => {
                    error!("Poll loop stopping: {message}");
                    publisher.report(WatchError::Fatal(message.clone()));
                    break Err(WatchError::Fatal(message));
                }
            },
        }
    };

    // Drop our senders before closing so receivers disconnect promptly.
    drop(publisher);
    shared.finish();
    info!("Poll loop stopped");
    result
}

/// One poll cycle.
///
/// The registry's write lock is held for the rebuild, diff and baseline swap
/// only; publishing happens after it is released so a slow consumer cannot
/// stall registration calls.
pub(super) fn tick(shared: &Shared, publisher: &Publisher<'_>, mode: Delivering) -> TickStatus {
    let started = Instant::now();
    let outcome = shared.registry.write().poll();

    let all_roots_failed = outcome.all_roots_failed();
    let roots = outcome.roots;
    for err in outcome.errors {
        warn!("{err}");
        publisher.report(err);
    }

    let kinds = shared.kinds.lock().clone();
    let cap = shared.config.max_events_per_tick.unwrap_or(usize::MAX);
    let total = outcome.events.len();
    let mut published = 0usize;
    let mut suppressed = 0u64;

    let mut events = outcome
        .events
        .into_iter()
        .filter(|event| kinds.as_ref().is_none_or(|k| k.contains(&event.kind)));
    while let Some(event) = events.next() {
        if published >= cap {
            suppressed += 1;
            continue;
        }
        let delivery = match mode {
            Delivering::Policy => publisher.publish(event, &shared.stop_rx),
            Delivering::Immediate => publisher.offer(event),
        };
        match delivery {
            Delivery::Sent => published += 1,
            Delivery::Dropped => {}
            Delivery::Stopped => {
                // Only what would still have gone out counts as dropped.
                let unsent = events.count().min(cap.saturating_sub(published + 1));
                shared.dispatcher.count_dropped(unsent as u64);
                return TickStatus::Stopped;
            }
        }
    }

    if suppressed > 0 {
        warn!("Per-tick event cap reached; {suppressed} events discarded");
        shared.dispatcher.count_dropped(suppressed);
    }

    debug!(
        "Tick: {total} changes, {published} published in {:?}",
        started.elapsed()
    );

    if all_roots_failed {
        return TickStatus::Fatal(format!("all {roots} registered roots are unreadable"));
    }
    TickStatus::Continue(published)
}
