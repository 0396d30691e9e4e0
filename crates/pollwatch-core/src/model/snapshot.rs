/// Point-in-time view of every watched entry.
///
/// Backed by an `IndexMap` so iteration follows discovery order (root before
/// children, directory before its contents). The differ relies on that order
/// to publish events deterministically.
use super::file_record::FileRecord;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: IndexMap<PathBuf, FileRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert `record` unless its path is already present.
    ///
    /// Returns `false` for a duplicate; the first record for a path wins, so
    /// overlapping roots never produce two rows for one entry.
    pub fn insert(&mut self, record: FileRecord) -> bool {
        match self.entries.entry(record.path.clone()) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Record at discovery position `index`.
    pub fn get_index(&self, index: usize) -> Option<&FileRecord> {
        self.entries.get_index(index).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.entries.values()
    }

    /// Owned copies of every record, in discovery order.
    pub fn records(&self) -> Vec<FileRecord> {
        self.entries.values().cloned().collect()
    }

    /// Keep only the records for which `keep` returns `true`, preserving order.
    /// Returns the number of records removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&FileRecord) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| keep(record));
        before - self.entries.len()
    }

    /// Remove every record at or below `root`.
    pub fn purge_under(&mut self, root: &Path) -> usize {
        self.retain(|record| !record.path.starts_with(root))
    }
}

impl FromIterator<FileRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}
