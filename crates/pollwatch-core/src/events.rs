/// Event dispatcher: change events and asynchronous errors on their way to
/// the caller.
///
/// Two crossbeam channels carry traffic out of the poll loop: one for
/// [`ChangeEvent`]s and one for non-fatal (and the final fatal) errors. Both
/// disconnect once the watcher is closed and the worker has exited, so a
/// consumer blocked in `recv()` wakes up with `Err(RecvError)` instead of
/// hanging.
///
/// # Backpressure
///
/// With a bounded event queue a slow consumer eventually fills it. The
/// [`Backpressure`] policy decides what the producer does then:
/// - `Block` waits for space, waking every [`STOP_CHECK_INTERVAL`] to see
///   whether the watcher was closed meanwhile;
/// - `DropNewest` discards the event and increments the drop counter.
///
/// Either way the snapshot baseline has already advanced, so each classified
/// change maps to exactly one snapshot transition whether or not it was
/// delivered.
use crate::error::WatchError;
use crate::model::FileRecord;
use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// How often a blocked producer re-checks the stop signal.
pub const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Kind of change detected between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Present now, absent from the baseline.
    Added,
    /// Present in both, with different size, mtime or mode.
    Modified,
    /// Present in the baseline, absent now.
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Removed => "REMOVED",
        })
    }
}

/// One outcome of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: EventKind,
    /// The entry's new state, or its last known state for removals.
    pub record: FileRecord,
    /// When the tick that produced this event ran.
    pub detected_at: DateTime<Local>,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, record: FileRecord, detected_at: DateTime<Local>) -> Self {
        Self {
            kind,
            record,
            detected_at,
        }
    }

    /// Base name of the subject entry.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Path of the subject entry.
    pub fn path(&self) -> &Path {
        &self.record.path
    }

    pub fn is_dir(&self) -> bool {
        self.record.is_dir
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.record.path.display())
    }
}

/// What a producer does when the event queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    #[default]
    Block,
    DropNewest,
}

/// Outcome of publishing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Dropped,
    /// The watcher was closed or every receiver is gone; stop publishing.
    Stopped,
}

/// Owner of both outbound channels.
///
/// Senders live behind `Option`s so that [`Dispatcher::close`] can drop them;
/// the poll loop works on clones obtained through [`Dispatcher::publisher`],
/// which it drops on exit.
pub(crate) struct Dispatcher {
    events_tx: Mutex<Option<Sender<ChangeEvent>>>,
    events_rx: Receiver<ChangeEvent>,
    errors_tx: Mutex<Option<Sender<WatchError>>>,
    errors_rx: Receiver<WatchError>,
    policy: Backpressure,
    dropped: AtomicU64,
}

impl Dispatcher {
    /// `capacity == 0` selects unbounded queues.
    pub(crate) fn new(capacity: usize, policy: Backpressure) -> Self {
        let (events_tx, events_rx) = channel(capacity);
        let (errors_tx, errors_rx) = channel(capacity);
        Self {
            events_tx: Mutex::new(Some(events_tx)),
            events_rx,
            errors_tx: Mutex::new(Some(errors_tx)),
            errors_rx,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn events(&self) -> Receiver<ChangeEvent> {
        self.events_rx.clone()
    }

    pub(crate) fn errors(&self) -> Receiver<WatchError> {
        self.errors_rx.clone()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn count_dropped(&self, n: u64) {
        if n > 0 {
            self.dropped.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Clones of both senders, or `None` once closed.
    pub(crate) fn publisher(&self) -> Option<Publisher<'_>> {
        let events = self.events_tx.lock().clone()?;
        let errors = self.errors_tx.lock().clone()?;
        Some(Publisher {
            events,
            errors,
            dispatcher: self,
        })
    }

    /// Drop the owned senders. Receivers disconnect once every publisher is
    /// gone too.
    pub(crate) fn close(&self) {
        self.events_tx.lock().take();
        self.errors_tx.lock().take();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.events_tx.lock().is_none()
    }
}

/// Sending half used by the poll loop for the duration of one run.
pub(crate) struct Publisher<'a> {
    events: Sender<ChangeEvent>,
    errors: Sender<WatchError>,
    dispatcher: &'a Dispatcher,
}

impl Publisher<'_> {
    /// Enqueue `event` under the dispatcher's backpressure policy.
    ///
    /// `stop` is the watcher's stop signal; a blocked send gives up once it
    /// has fired.
    pub(crate) fn publish(&self, event: ChangeEvent, stop: &Receiver<()>) -> Delivery {
        match self.dispatcher.policy {
            Backpressure::DropNewest => self.offer(event),
            Backpressure::Block => {
                let mut pending = event;
                loop {
                    match self.events.send_timeout(pending, STOP_CHECK_INTERVAL) {
                        Ok(()) => return Delivery::Sent,
                        Err(SendTimeoutError::Timeout(event)) => {
                            if stop_requested(stop) {
                                self.dispatcher.count_dropped(1);
                                return Delivery::Stopped;
                            }
                            pending = event;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => return Delivery::Stopped,
                    }
                }
            }
        }
    }

    /// Enqueue `event` without waiting, whatever the policy. A full queue
    /// drops the event and counts it.
    pub(crate) fn offer(&self, event: ChangeEvent) -> Delivery {
        match self.events.try_send(event) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dispatcher.count_dropped(1);
                Delivery::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Delivery::Stopped,
        }
    }

    /// Enqueue an error without blocking; overflow is logged and discarded.
    pub(crate) fn report(&self, err: WatchError) {
        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => warn!("Error queue full, discarding: {err}"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// `true` once the stop signal's sender has been dropped.
pub(crate) fn stop_requested(stop: &Receiver<()>) -> bool {
    matches!(stop.try_recv(), Err(TryRecvError::Disconnected))
}

fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    if capacity == 0 {
        crossbeam_channel::unbounded()
    } else {
        crossbeam_channel::bounded(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compact_str::CompactString;
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> ChangeEvent {
        let record = FileRecord {
            path: PathBuf::from(path),
            name: CompactString::new(Path::new(path).file_name().unwrap().to_string_lossy()),
            dir: CompactString::default(),
            size: 0,
            modified: None,
            mode: 0,
            is_dir: false,
        };
        ChangeEvent::new(kind, record, Local::now())
    }

    #[test]
    fn event_accessors_and_display() {
        let ev = event(EventKind::Removed, "root/file.txt");
        assert_eq!(ev.name(), "file.txt");
        assert_eq!(ev.path(), Path::new("root/file.txt"));
        assert_eq!(ev.to_string(), "REMOVED root/file.txt");
    }

    #[test]
    fn event_serialises_kind_in_snake_case() {
        let json = serde_json::to_value(event(EventKind::Added, "a/b.txt")).unwrap();
        assert_eq!(json["kind"], "added");
        assert_eq!(json["record"]["name"], "b.txt");
    }

    #[test]
    fn drop_newest_counts_overflow() {
        let dispatcher = Dispatcher::new(1, Backpressure::DropNewest);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let publisher = dispatcher.publisher().unwrap();

        assert_eq!(publisher.publish(event(EventKind::Added, "a/1"), &stop_rx), Delivery::Sent);
        assert_eq!(publisher.publish(event(EventKind::Added, "a/2"), &stop_rx), Delivery::Dropped);
        assert_eq!(dispatcher.dropped(), 1);
        assert_eq!(dispatcher.events().try_recv().unwrap().name(), "1");
    }

    #[test]
    fn blocked_send_gives_up_after_stop() {
        let dispatcher = Dispatcher::new(1, Backpressure::Block);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let publisher = dispatcher.publisher().unwrap();

        assert_eq!(publisher.publish(event(EventKind::Added, "a/1"), &stop_rx), Delivery::Sent);
        drop(stop_tx);
        assert_eq!(publisher.publish(event(EventKind::Added, "a/2"), &stop_rx), Delivery::Stopped);
        assert_eq!(dispatcher.dropped(), 1);
    }

    #[test]
    fn close_disconnects_receivers_after_publishers_drop() {
        let dispatcher = Dispatcher::new(0, Backpressure::Block);
        let events = dispatcher.events();
        let publisher = dispatcher.publisher().unwrap();

        dispatcher.close();
        assert!(dispatcher.is_closed());
        assert!(dispatcher.publisher().is_none());

        // The outstanding publisher still works until it is dropped.
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        assert_eq!(publisher.publish(event(EventKind::Modified, "a/x"), &stop_rx), Delivery::Sent);
        drop(publisher);

        assert!(events.recv().is_ok());
        assert!(events.recv().is_err());
    }
}
