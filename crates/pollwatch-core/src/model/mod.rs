/// Data model for the watcher.
///
/// A [`Snapshot`] maps every watched path to the [`FileRecord`] captured for
/// it during the most recent listing.
pub mod file_record;
pub mod snapshot;

pub use file_record::FileRecord;
pub use snapshot::Snapshot;
