/// Watcher: the public facade over the registry and the poll scheduler.
///
/// A [`Watcher`] is a cheap, cloneable handle. All clones share one
/// [`Registry`] behind a single `RwLock`: registration calls take the write
/// lock, and so does each tick for its rebuild/diff/swap sequence, so a
/// concurrent `add`/`remove` never interleaves with a tick's
/// read-then-replace of the baseline.
///
/// # Lifecycle
///
/// ```text
/// Idle ──start/spawn──► Running ──close / fatal error──► Stopped
///   └──────────────────close──────────────────────────────┘
/// ```
///
/// `Stopped` is terminal. Closing drops the channel senders, so consumers
/// blocked on [`Watcher::events`] or [`Watcher::errors`] wake up once the
/// worker has finished its current tick.
///
/// # Usage
///
/// ```no_run
/// use pollwatch_core::Watcher;
/// use std::time::Duration;
///
/// let watcher = Watcher::new();
/// watcher.add_recursive("src")?;
/// let events = watcher.events();
/// let handle = watcher.spawn(Duration::from_millis(100))?;
///
/// for event in events.iter().take(1) {
///     println!("{event}");
/// }
/// handle.stop();
/// handle.join()?;
/// # Ok::<(), pollwatch_core::WatchError>(())
/// ```
mod poll_loop;

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::events::{ChangeEvent, Dispatcher, EventKind};
use crate::model::FileRecord;
use crate::registry::Registry;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Constructed, not started.
    Idle,
    /// The poll loop is ticking.
    Running,
    /// Closed or failed. Terminal.
    Stopped,
}

/// State shared by every clone of a [`Watcher`] and its worker thread.
struct Shared {
    registry: RwLock<Registry>,
    state: Mutex<PollState>,
    /// Never sent on; dropping the sender is the stop signal.
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    dispatcher: Dispatcher,
    /// Event kinds to publish; `None` publishes everything.
    kinds: Mutex<Option<Vec<EventKind>>>,
    config: WatchConfig,
}

impl Shared {
    /// Enter `Stopped`, fire the stop signal and release the channel senders.
    fn finish(&self) {
        *self.state.lock() = PollState::Stopped;
        self.stop_tx.lock().take();
        self.dispatcher.close();
    }
}

#[derive(Clone)]
pub struct Watcher {
    shared: Arc<Shared>,
}

impl Watcher {
    /// Idle watcher with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let registry = Registry::with_scan_settings(config.ignore_hidden, config.parallel_scan);
        Self {
            shared: Arc::new(Shared {
                registry: RwLock::new(registry),
                state: Mutex::new(PollState::Idle),
                stop_tx: Mutex::new(Some(stop_tx)),
                stop_rx,
                dispatcher: Dispatcher::new(config.channel_capacity, config.backpressure),
                kinds: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.shared.config
    }

    // ── Registry ────────────────────────────────────────────────────────────

    /// Watch `path` and its direct children.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        self.add_with_mode(path, false)
    }

    /// Watch `path` and everything beneath it.
    pub fn add_recursive(&self, path: impl AsRef<Path>) -> Result<()> {
        self.add_with_mode(path, true)
    }

    /// Register `path`, listing it immediately to seed the baseline.
    ///
    /// Fails with [`WatchError::NotFound`] if `path` does not exist.
    /// Registering an already watched path re-scans it.
    pub fn add_with_mode(&self, path: impl AsRef<Path>, recursive: bool) -> Result<()> {
        self.shared.registry.write().add(path, recursive)
    }

    /// Stop watching `path`, dropping every entry rooted there.
    ///
    /// Fails with [`WatchError::NotFound`] if `path` was never registered.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        self.shared.registry.write().remove(path).map(|_| ())
    }

    /// Same as [`Watcher::remove`]: the whole subtree under `path` is always
    /// purged, whichever mode it was registered with.
    pub fn remove_recursive(&self, path: impl AsRef<Path>) -> Result<()> {
        self.remove(path)
    }

    /// Exclude `path` and its descendants from listing and diffing.
    pub fn ignore(&self, path: impl AsRef<Path>) -> Result<()> {
        self.shared.registry.write().ignore(path).map(|_| ())
    }

    /// Only entries for which `hook` returns `true` are watched.
    pub fn set_filter_hook<F>(&self, hook: F)
    where
        F: Fn(&FileRecord) -> bool + Send + Sync + 'static,
    {
        self.shared.registry.write().set_filter_hook(Arc::new(hook));
    }

    /// Drop the inclusion predicate. Entries it was hiding are reported as
    /// added by the next tick.
    pub fn clear_filter_hook(&self) {
        self.shared.registry.write().clear_filter_hook();
    }

    /// Ignored paths, in absolute form.
    pub fn ignored_paths(&self) -> Vec<PathBuf> {
        self.shared.registry.read().rules().ignored_paths().to_vec()
    }

    /// Publish only events of the listed kinds. An empty slice restores the
    /// default of publishing everything.
    pub fn filter_kinds(&self, kinds: &[EventKind]) {
        *self.shared.kinds.lock() = if kinds.is_empty() {
            None
        } else {
            Some(kinds.to_vec())
        };
    }

    /// Registered roots, in registration order.
    pub fn names(&self) -> Vec<PathBuf> {
        self.shared
            .registry
            .read()
            .names()
            .iter()
            .map(|w| w.path.clone())
            .collect()
    }

    /// Copy of the live snapshot, in discovery order.
    pub fn watched_files(&self) -> Vec<FileRecord> {
        self.shared.registry.read().files().records()
    }

    // ── Channels ────────────────────────────────────────────────────────────

    /// Receiver for change events.
    pub fn events(&self) -> Receiver<ChangeEvent> {
        self.shared.dispatcher.events()
    }

    /// Receiver for asynchronous (non-fatal and final fatal) errors.
    pub fn errors(&self) -> Receiver<WatchError> {
        self.shared.dispatcher.errors()
    }

    /// Events discarded by the backpressure policy or the per-tick cap.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dispatcher.dropped()
    }

    // ── Scheduler ───────────────────────────────────────────────────────────

    pub fn state(&self) -> PollState {
        *self.shared.state.lock()
    }

    /// Run the poll loop on the calling thread until [`Watcher::close`] is
    /// called (from another clone) or a fatal error occurs.
    pub fn start(&self, interval: Duration) -> Result<()> {
        self.begin(interval)?;
        poll_loop::run(&self.shared, interval)
    }

    /// [`Watcher::start`] with the configured poll interval.
    pub fn start_configured(&self) -> Result<()> {
        self.start(self.shared.config.poll_interval())
    }

    /// Run the poll loop on a dedicated worker thread.
    ///
    /// State checks happen before the thread is spawned, so
    /// [`WatchError::AlreadyRunning`] is reported to the caller directly.
    pub fn spawn(&self, interval: Duration) -> Result<PollHandle> {
        self.begin(interval)?;
        let watcher = self.clone();
        let spawned = thread::Builder::new()
            .name("pollwatch-poller".into())
            .spawn(move || poll_loop::run(&watcher.shared, interval));

        match spawned {
            Ok(thread) => Ok(PollHandle {
                watcher: self.clone(),
                thread: Some(thread),
            }),
            Err(err) => {
                self.shared.finish();
                Err(err.into())
            }
        }
    }

    /// Run exactly one tick on the calling thread, without the timer.
    ///
    /// Returns the number of events published. Only valid while `Idle`.
    ///
    /// Events never wait for queue space here, whatever the
    /// [`Backpressure`](crate::events::Backpressure) policy: the caller is
    /// often the only consumer, so a full queue drops the overflow and counts
    /// it in [`Watcher::dropped_events`].
    pub fn poll_once(&self) -> Result<usize> {
        match self.state() {
            PollState::Idle => {}
            PollState::Running => return Err(WatchError::AlreadyRunning),
            PollState::Stopped => return Err(WatchError::Closed),
        }
        let publisher = self
            .shared
            .dispatcher
            .publisher()
            .ok_or(WatchError::Closed)?;
        match poll_loop::tick(&self.shared, &publisher, poll_loop::Delivering::Immediate) {
            poll_loop::TickStatus::Continue(published) => Ok(published),
            poll_loop::TickStatus::Stopped => Err(WatchError::Closed),
            poll_loop::TickStatus::Fatal(message) => {
                publisher.report(WatchError::Fatal(message.clone()));
                drop(publisher);
                self.shared.finish();
                Err(WatchError::Fatal(message))
            }
        }
    }

    /// Stop the loop (after its current tick) and close both channels.
    /// Idempotent.
    pub fn close(&self) {
        if !self.shared.dispatcher.is_closed() {
            info!("Closing watcher");
        }
        self.shared.finish();
    }

    fn begin(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(WatchError::InvalidInterval);
        }
        let mut state = self.shared.state.lock();
        match *state {
            PollState::Running => Err(WatchError::AlreadyRunning),
            PollState::Stopped => Err(WatchError::Closed),
            PollState::Idle => {
                *state = PollState::Running;
                Ok(())
            }
        }
    }
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a poll loop running on its own thread.
pub struct PollHandle {
    watcher: Watcher,
    thread: Option<thread::JoinHandle<Result<()>>>,
}

impl PollHandle {
    /// Request the loop to stop and close the watcher. Non-blocking.
    pub fn stop(&self) {
        self.watcher.close();
    }

    /// `true` once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the worker to exit and return how the loop ended.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| WatchError::Fatal("poll thread panicked".into()))?,
            None => Ok(()),
        }
    }
}
