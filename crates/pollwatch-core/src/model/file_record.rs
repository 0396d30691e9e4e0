/// A single filesystem entry captured during a listing.
///
/// Records are immutable snapshots of metadata: each tick produces fresh
/// records rather than mutating the previous ones. Change detection compares
/// size, modification time and mode bits only; file contents are never read.
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path as reached from the registered root (not canonicalised).
    pub path: PathBuf,

    /// Base name of the entry.
    pub name: CompactString,

    /// Base name of the directory that was being listed when this entry was
    /// found: the immediate parent for children, the entry itself for a
    /// listing root.
    pub dir: CompactString,

    /// Length in bytes as reported by the filesystem.
    pub size: u64,

    /// Last-modified timestamp, if the platform reports one.
    pub modified: Option<SystemTime>,

    /// Permission/mode bits. On Unix this is the raw `st_mode`, which also
    /// encodes the file type.
    pub mode: u32,

    /// `true` if this entry is a directory.
    pub is_dir: bool,
}

impl FileRecord {
    /// Build a record from already-fetched metadata.
    pub fn from_metadata(path: PathBuf, dir: CompactString, meta: &Metadata) -> Self {
        Self {
            name: display_name(&path),
            path,
            dir,
            size: meta.len(),
            modified: meta.modified().ok(),
            mode: mode_bits(meta),
            is_dir: meta.is_dir(),
        }
    }

    /// Stat `path` without following a trailing symlink.
    pub fn stat(path: impl Into<PathBuf>, dir: CompactString) -> io::Result<Self> {
        let path = path.into();
        let meta = std::fs::symlink_metadata(&path)?;
        Ok(Self::from_metadata(path, dir, &meta))
    }

    /// `true` when `other` carries the same size, modification time and mode.
    ///
    /// A flip between file and directory is also treated as a change.
    pub fn same_state(&self, other: &FileRecord) -> bool {
        self.size == other.size
            && self.modified == other.modified
            && self.mode == other.mode
            && self.is_dir == other.is_dir
    }
}

/// Base name of `path`, falling back to the full path for roots such as
/// `/` or `.` that have no final component.
pub(crate) fn display_name(path: &Path) -> CompactString {
    match path.file_name() {
        Some(name) => CompactString::new(name.to_string_lossy()),
        None => {
            let s = path.to_string_lossy();
            let trimmed = s.trim_end_matches(['/', '\\']);
            CompactString::new(if trimmed.is_empty() { s.as_ref() } else { trimmed })
        }
    }
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    // Only the read-only flag is portable; express it in Unix terms.
    if meta.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}
