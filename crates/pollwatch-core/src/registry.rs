/// Path registry: the watched roots (`names`) and the live snapshot rows
/// they contribute (`files`), plus the ignore rules applied to both.
///
/// The registry is a plain data structure with no locking of its own; the
/// [`Watcher`](crate::watcher::Watcher) wraps it in a single `RwLock` shared by
/// the registration API and the poll loop.
///
/// Invariant: every record in `files` is covered by some entry in `names` and
/// is admitted by the ignore rules.
use crate::diff::diff;
use crate::error::{Result, WatchError};
use crate::events::ChangeEvent;
use crate::filter::{FilterHook, IgnoreRules};
use crate::model::{FileRecord, Snapshot};
use crate::scanner::{scan, scan_pool, ScanOptions};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A root registered by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedPath {
    pub path: PathBuf,
    pub recursive: bool,
}

impl WatchedPath {
    /// `true` if a listing of this root could produce a record for `path`.
    pub fn covers(&self, path: &Path) -> bool {
        if self.recursive {
            path.starts_with(&self.path)
        } else {
            path == self.path || path.parent() == Some(self.path.as_path())
        }
    }
}

/// Everything one tick produced.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub events: Vec<ChangeEvent>,
    /// Per-entry and per-root listing errors.
    pub errors: Vec<WatchError>,
    /// Roots whose listing failed outright this tick.
    pub failed_roots: usize,
    /// Roots registered when the tick ran.
    pub roots: usize,
}

impl TickOutcome {
    /// Every registered root failed; the loop has nothing left to watch.
    pub fn all_roots_failed(&self) -> bool {
        self.roots > 0 && self.failed_roots == self.roots
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    names: Vec<WatchedPath>,
    files: Snapshot,
    rules: IgnoreRules,
    skip_hidden: bool,
    /// Shared by every parallel walk this registry runs.
    pool: Option<Arc<ThreadPool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose listings skip hidden entries and/or walk in parallel.
    ///
    /// The walk pool is built here, once. If its threads cannot be spawned
    /// the registry falls back to serial walks.
    pub fn with_scan_settings(skip_hidden: bool, parallel: bool) -> Self {
        let pool = if parallel {
            match scan_pool() {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!("Parallel scanning unavailable, walking serially: {err}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            skip_hidden,
            pool,
            ..Self::default()
        }
    }

    /// `true` if walks run on a rayon pool.
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Register `path` and seed the baseline with its current contents.
    ///
    /// No events are produced for the seeded entries. Registering a path
    /// again re-scans it (adopting the new `recursive` mode) without
    /// duplicating its name.
    pub fn add(&mut self, path: impl AsRef<Path>, recursive: bool) -> Result<()> {
        let path = path.as_ref();
        let listing = scan(path, &self.scan_options(recursive), &self.rules)?;
        for err in &listing.errors {
            warn!("Registering {}: {err}", path.display());
        }

        let watched = WatchedPath {
            path: path.to_path_buf(),
            recursive,
        };
        match self.position(path) {
            Some(idx) => {
                // Drop this root's old rows so the fresh listing replaces them.
                debug!("Re-scanning already registered {}", path.display());
                let previous = self.names.remove(idx);
                self.purge_orphans_under(&previous.path);
                self.names.insert(idx, watched);
            }
            None => self.names.push(watched),
        }

        let mut inserted = 0usize;
        for record in listing.records {
            if self.files.insert(record) {
                inserted += 1;
            }
        }

        info!(
            "Watching {} ({}, {inserted} entries)",
            path.display(),
            if recursive { "recursive" } else { "single level" }
        );
        Ok(())
    }

    /// Unregister `path` and drop every row only it contributed.
    ///
    /// Rows still covered by another registered root are kept. Returns the
    /// number of rows removed.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let idx = self
            .position(path)
            .ok_or_else(|| WatchError::NotFound(path.to_path_buf()))?;
        let removed = self.names.remove(idx);

        let purged = self.purge_orphans_under(&removed.path);
        info!("Stopped watching {} ({purged} entries dropped)", path.display());
        Ok(purged)
    }

    /// Exclude `path` (and its descendants) from now on, purging matching rows.
    pub fn ignore(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        self.rules.ignore_path(path)?;
        let purged = self.purge_inadmissible();
        debug!("Ignoring {} ({purged} entries dropped)", path.display());
        Ok(purged)
    }

    /// Install an inclusion predicate, purging rows it rejects.
    pub fn set_filter_hook(&mut self, hook: FilterHook) -> usize {
        self.rules.set_hook(hook);
        self.purge_inadmissible()
    }

    /// Remove the inclusion predicate. Entries it excluded are picked up by
    /// the next poll and reported as added.
    pub fn clear_filter_hook(&mut self) {
        self.rules.clear_hook();
    }

    pub fn names(&self) -> &[WatchedPath] {
        &self.names
    }

    pub fn files(&self) -> &Snapshot {
        &self.files
    }

    pub fn rules(&self) -> &IgnoreRules {
        &self.rules
    }

    /// Re-list every root into a fresh snapshot, diff it against the
    /// baseline, and make it the new baseline.
    pub fn poll(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome {
            roots: self.names.len(),
            ..TickOutcome::default()
        };
        let mut current = Snapshot::with_capacity(self.files.len());

        for watched in &self.names {
            match scan(&watched.path, &self.scan_options(watched.recursive), &self.rules) {
                Ok(listing) => {
                    for record in listing.records {
                        current.insert(record);
                    }
                    outcome.errors.extend(listing.errors);
                }
                Err(err) => {
                    outcome.failed_roots += 1;
                    outcome.errors.push(err);
                }
            }
        }

        outcome.events = diff(&self.files, &current);
        self.files = current;
        outcome
    }

    fn scan_options(&self, recursive: bool) -> ScanOptions {
        ScanOptions {
            recursive,
            skip_hidden: self.skip_hidden,
            pool: self.pool.clone(),
        }
    }

    /// Index of the registered root naming the same location as `path`,
    /// however either was spelled.
    fn position(&self, path: &Path) -> Option<usize> {
        let wanted = identity(path);
        self.names.iter().position(|w| identity(&w.path) == wanted)
    }

    /// Drop rows at or below `root` that no registered root still covers.
    fn purge_orphans_under(&mut self, root: &Path) -> usize {
        let names = &self.names;
        self.files.retain(|record| {
            !record.path.starts_with(root) || names.iter().any(|w| w.covers(&record.path))
        })
    }

    fn purge_inadmissible(&mut self) -> usize {
        let rules = &self.rules;
        self.files.retain(|record: &FileRecord| rules.admits(record))
    }
}

/// Absolute form of `path`, without resolving symlinks. The same
/// normalisation [`IgnoreRules`] applies to ignored paths.
fn identity(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("test_folder");
        let nested = root.join("test_folder_recursive");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("file.txt"), b"").unwrap();
        fs::write(nested.join("file_recursive.txt"), b"").unwrap();
        (tmp, root)
    }

    #[test]
    fn add_recursive_seeds_every_entry() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();

        assert_eq!(reg.files().len(), 4);
        assert_eq!(reg.names()[0].path, root);
        assert_eq!(reg.files().get_index(0).unwrap().dir, "test_folder");
        assert_eq!(reg.files().get_index(1).unwrap().dir, "test_folder");
        assert_eq!(reg.files().get_index(3).unwrap().dir, "test_folder_recursive");
    }

    #[test]
    fn add_single_level_stops_at_children() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, false).unwrap();
        assert_eq!(reg.files().len(), 3);
    }

    #[test]
    fn re_adding_does_not_duplicate_name() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, false).unwrap();
        reg.add(&root, true).unwrap();
        assert_eq!(reg.names().len(), 1);
        assert!(reg.names()[0].recursive);
        assert_eq!(reg.files().len(), 4);
    }

    #[test]
    fn add_missing_path_changes_nothing() {
        let mut reg = Registry::new();
        let err = reg.add("random_filename.txt", false).unwrap_err();
        assert!(matches!(err, WatchError::NotFound(_)));
        assert!(reg.names().is_empty());
        assert!(reg.files().is_empty());
    }

    #[test]
    fn remove_clears_subtree_and_name() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        assert_eq!(reg.remove(&root).unwrap(), 4);
        assert!(reg.files().is_empty());
        assert!(reg.names().is_empty());
    }

    #[test]
    fn remove_unregistered_is_not_found() {
        let mut reg = Registry::new();
        assert!(matches!(reg.remove("nope"), Err(WatchError::NotFound(_))));
    }

    #[test]
    fn remove_keeps_rows_covered_by_another_root() {
        let (_tmp, root) = fixture();
        let nested = root.join("test_folder_recursive");
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        reg.add(&nested, false).unwrap();
        assert_eq!(reg.files().len(), 4);

        assert_eq!(reg.remove(&nested).unwrap(), 0);
        assert_eq!(reg.files().len(), 4);

        assert_eq!(reg.remove(&root).unwrap(), 4);
        assert!(reg.files().is_empty());
    }

    #[test]
    fn ignore_purges_existing_rows() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();

        assert_eq!(reg.ignore(root.join("test_folder_recursive")).unwrap(), 2);
        assert_eq!(reg.files().len(), 2);

        // Ignored entries stay out of later ticks too.
        assert!(reg.poll().events.is_empty());
        assert_eq!(reg.files().len(), 2);
    }

    #[test]
    fn filter_hook_purges_and_filters() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();

        let purged = reg.set_filter_hook(Arc::new(|r: &FileRecord| r.is_dir));
        assert_eq!(purged, 2);
        fs::write(root.join("another.txt"), b"x").unwrap();

        let outcome = reg.poll();
        assert!(outcome.events.iter().all(|e| e.is_dir()));
        assert!(reg.files().iter().all(|r| r.is_dir));
    }

    #[test]
    fn quiet_poll_is_empty() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        let first = reg.poll();
        assert!(first.events.is_empty());
        assert!(reg.poll().events.is_empty());
    }

    #[test]
    fn poll_reports_removed_file() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        fs::remove_file(root.join("file.txt")).unwrap();

        let outcome = reg.poll();
        assert!(outcome
            .events
            .iter()
            .any(|e| e.kind == EventKind::Removed && e.name() == "file.txt"));
        assert!(!outcome.all_roots_failed());
    }

    #[test]
    fn vanished_root_is_a_failed_root() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        fs::remove_dir_all(&root).unwrap();

        let outcome = reg.poll();
        assert!(outcome.all_roots_failed());
        assert_eq!(outcome.events.len(), 4);
        assert!(outcome.events.iter().all(|e| e.kind == EventKind::Removed));
        assert!(matches!(outcome.errors[0], WatchError::NotFound(_)));
        // The name survives so the root is picked up again if it reappears.
        assert_eq!(reg.names().len(), 1);
    }

    #[test]
    fn same_root_spelled_two_ways_is_one_name() {
        // Relative to the working directory, so the two spellings differ.
        let tmp = TempDir::new_in(".").unwrap();
        let relative = tmp.path().join("x");
        fs::create_dir(&relative).unwrap();
        fs::write(relative.join("file.txt"), b"").unwrap();
        let absolute = std::path::absolute(&relative).unwrap();
        assert_ne!(relative, absolute);

        let mut reg = Registry::new();
        reg.add(&relative, false).unwrap();
        reg.add(&absolute, false).unwrap();

        assert_eq!(reg.names().len(), 1);
        assert_eq!(reg.names()[0].path, absolute);
        assert_eq!(reg.files().len(), 2);

        fs::write(absolute.join("file.txt"), b"grown").unwrap();
        assert_eq!(reg.poll().events.len(), 1);

        reg.remove(&relative).unwrap();
        assert!(reg.names().is_empty());
        assert!(reg.files().is_empty());
    }

    #[test]
    fn clearing_the_hook_readmits_on_next_poll() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::new();
        reg.add(&root, true).unwrap();
        reg.set_filter_hook(Arc::new(|r: &FileRecord| r.is_dir));
        assert_eq!(reg.files().len(), 2);

        reg.clear_filter_hook();
        let outcome = reg.poll();
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome.events.iter().all(|e| e.kind == EventKind::Added));
        assert_eq!(reg.files().len(), 4);
    }

    #[test]
    fn parallel_registry_reuses_one_pool() {
        let (_tmp, root) = fixture();
        let mut reg = Registry::with_scan_settings(false, true);
        assert!(reg.is_parallel());
        reg.add(&root, true).unwrap();
        assert_eq!(reg.files().len(), 4);

        let pool = reg.scan_options(true).pool.unwrap();
        for _ in 0..3 {
            assert!(reg.poll().events.is_empty());
        }
        let again = reg.scan_options(true).pool.unwrap();
        assert!(Arc::ptr_eq(&pool, &again));
    }
}
