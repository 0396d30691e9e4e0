/// Error taxonomy for the watcher.
///
/// Operation-level failures (`add`, `remove`, `list_files`, `start`) are
/// returned directly to the caller. Per-entry listing failures that happen
/// during a tick travel on the watcher's error channel instead, and the loop
/// carries on.
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Error, Debug)]
pub enum WatchError {
    /// A registration, removal or listing referenced a path that does not exist
    /// (or, for removal, was never registered).
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// `start` / `spawn` called while the poll loop is already running.
    #[error("poll loop is already running")]
    AlreadyRunning,

    /// The watcher was closed; a stopped watcher cannot be restarted.
    #[error("watcher is closed")]
    Closed,

    /// A poll interval of zero would spin the scheduler.
    #[error("poll interval must be greater than zero")]
    InvalidInterval,

    /// A single entry could not be read during a listing. Non-fatal.
    #[error("failed to list {}: {message}", path.display())]
    Listing { path: PathBuf, message: String },

    /// The loop cannot continue and has transitioned to `Stopped`.
    #[error("fatal watcher error: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Build a [`WatchError::Listing`] from any displayable error.
    pub(crate) fn listing(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Listing {
            path: path.into(),
            message: format!("{err}"),
        }
    }

    /// Map an I/O error on `path` to `NotFound` when appropriate, otherwise to
    /// a listing error.
    pub(crate) fn from_stat(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::listing(path, err)
        }
    }

    /// `true` for errors that leave the poll loop running.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Listing { .. } | Self::NotFound(_))
    }
}
