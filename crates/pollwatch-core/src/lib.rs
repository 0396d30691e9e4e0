/// pollwatch core: a portable, polling-based filesystem change detector.
///
/// Watched paths are re-listed on a timer and each fresh listing is diffed
/// against the previous one. No OS notification API is involved, so the
/// behaviour is the same on every platform; latency is bounded by the poll
/// interval.
///
/// # Modules
///
/// - [`model`]: `FileRecord` and the ordered `Snapshot`.
/// - [`scanner`]: directory lister (root first, then children in sorted order).
/// - [`filter`]: ignore rules: explicit paths and an inclusion hook.
/// - [`registry`]: watched roots plus the live snapshot they contribute.
/// - [`diff`]: classifies paths as added, modified or removed.
/// - [`events`]: change events and the outbound channels.
/// - [`watcher`]: the poll scheduler and the public `Watcher` facade.
/// - [`config`]: `WatchConfig`.
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod filter;
pub mod model;
pub mod registry;
pub mod scanner;
pub mod watcher;

pub use config::WatchConfig;
pub use error::{Result, WatchError};
pub use events::{Backpressure, ChangeEvent, EventKind};
pub use model::{FileRecord, Snapshot};
pub use scanner::list_files;
pub use watcher::{PollHandle, PollState, Watcher};
