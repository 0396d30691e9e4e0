/// Scanner module: the directory lister.
///
/// A listing always starts with the record for the root itself (position 0),
/// followed by its children in sorted directory order. In recursive mode each
/// sub-directory is followed by its own contents before the next sibling, so a
/// directory is always listed before anything beneath it.
///
/// Per-entry failures (permission denied, entry deleted mid-scan) are
/// collected in [`Listing::errors`] and the walk continues; only an unreadable
/// root aborts the listing.
pub mod walk;

use crate::error::{Result, WatchError};
use crate::filter::IgnoreRules;
use crate::model::file_record::display_name;
use crate::model::FileRecord;
use rayon::ThreadPool;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// How a root is listed.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Descend into sub-directories transitively.
    pub recursive: bool,
    /// Skip entries whose name starts with `.` (the root itself is exempt).
    pub skip_hidden: bool,
    /// Walk on this rayon pool instead of the calling thread. Output order is
    /// unchanged.
    pub pool: Option<Arc<ThreadPool>>,
}

impl ScanOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }
}

/// Build the rayon pool used for parallel walks, sized to the CPU count.
///
/// Callers keep the pool for as long as they keep scanning; a failure to
/// spawn its threads is returned so the caller can fall back to serial walks.
pub fn scan_pool() -> std::result::Result<Arc<ThreadPool>, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .thread_name(|i| format!("pollwatch-scan-{i}"))
        .build()
        .map(Arc::new)
}

/// Result of listing one root.
#[derive(Debug, Default)]
pub struct Listing {
    /// Records in discovery order; the root (if admitted) is first.
    pub records: Vec<FileRecord>,
    /// Non-fatal errors for individual entries.
    pub errors: Vec<WatchError>,
}

/// List `path` itself followed by its direct children.
///
/// Fails with [`WatchError::NotFound`] if `path` does not exist. Entries that
/// cannot be read are skipped and logged.
pub fn list_files(path: impl AsRef<Path>) -> Result<Vec<FileRecord>> {
    let path = path.as_ref();
    let listing = scan(path, &ScanOptions::default(), &IgnoreRules::default())?;
    for err in &listing.errors {
        warn!("Skipping unreadable entry: {err}");
    }
    Ok(listing.records)
}

/// List `root` according to `options`, dropping anything `rules` excludes.
pub fn scan(root: &Path, options: &ScanOptions, rules: &IgnoreRules) -> Result<Listing> {
    let meta = std::fs::metadata(root).map_err(|err| WatchError::from_stat(root, err))?;
    let mut listing = Listing::default();

    if rules.is_path_ignored(root) {
        return Ok(listing);
    }

    // The root lists as its own directory.
    let root_record = FileRecord::from_metadata(root.to_path_buf(), display_name(root), &meta);
    if rules.passes_hook(&root_record) {
        listing.records.push(root_record);
    }

    if meta.is_dir() {
        walk::walk_children(root, options, rules, &mut listing);
    }

    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// ```text
    /// test_folder/
    ///   file.txt
    ///   test_folder_recursive/
    ///     file_recursive.txt
    /// ```
    fn fixture() -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("test_folder");
        let nested = root.join("test_folder_recursive");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("file.txt"), b"").unwrap();
        fs::write(nested.join("file_recursive.txt"), b"nested").unwrap();
        (tmp, root)
    }

    #[test]
    fn list_files_puts_root_first() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("test_folder");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("file.txt"), b"").unwrap();

        let records = list_files(&root).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "test_folder");
        assert!(records[0].is_dir);
        assert_eq!(records[1].name, "file.txt");
    }

    #[test]
    fn list_files_is_single_level() {
        let (_tmp, root) = fixture();
        let names: Vec<_> = list_files(&root)
            .unwrap()
            .into_iter()
            .map(|r| r.name.to_string())
            .collect();
        assert_eq!(names, ["test_folder", "file.txt", "test_folder_recursive"]);
    }

    #[test]
    fn list_files_missing_path_is_not_found() {
        let err = list_files("random_filename.txt").unwrap_err();
        assert!(matches!(err, WatchError::NotFound(_)));
    }

    #[test]
    fn recursive_scan_sets_immediate_parent_dir() {
        let (_tmp, root) = fixture();
        let listing = scan(&root, &ScanOptions::recursive(), &IgnoreRules::default()).unwrap();
        assert!(listing.errors.is_empty());

        let rows: Vec<_> = listing
            .records
            .iter()
            .map(|r| (r.name.as_str(), r.dir.as_str()))
            .collect();
        assert_eq!(
            rows,
            [
                ("test_folder", "test_folder"),
                ("file.txt", "test_folder"),
                ("test_folder_recursive", "test_folder"),
                ("file_recursive.txt", "test_folder_recursive"),
            ]
        );
    }

    #[test]
    fn parallel_scan_matches_serial_order() {
        let (_tmp, root) = fixture();
        for i in 0..20 {
            fs::write(root.join(format!("bulk{i:02}.txt")), b"x").unwrap();
        }
        let serial = scan(&root, &ScanOptions::recursive(), &IgnoreRules::default()).unwrap();
        let options = ScanOptions {
            recursive: true,
            pool: Some(scan_pool().unwrap()),
            ..ScanOptions::default()
        };
        let parallel = scan(&root, &options, &IgnoreRules::default()).unwrap();
        // The pool outlives a walk and serves the next one.
        let again = scan(&root, &options, &IgnoreRules::default()).unwrap();
        let paths = |l: &Listing| l.records.iter().map(|r| r.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&serial), paths(&parallel));
        assert_eq!(paths(&serial), paths(&again));
    }

    #[test]
    fn scan_of_a_file_yields_only_the_file() {
        let (_tmp, root) = fixture();
        let file = root.join("file.txt");
        let listing = scan(&file, &ScanOptions::recursive(), &IgnoreRules::default()).unwrap();
        assert_eq!(listing.records.len(), 1);
        assert_eq!(listing.records[0].name, "file.txt");
    }

    #[test]
    fn rules_prune_ignored_subtrees_and_hook_matches() {
        let (_tmp, root) = fixture();
        let mut rules = IgnoreRules::new();
        rules
            .ignore_path(&root.join("test_folder_recursive"))
            .unwrap();
        let listing = scan(&root, &ScanOptions::recursive(), &rules).unwrap();
        let names: Vec<_> = listing.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["test_folder", "file.txt"]);

        let mut rules = IgnoreRules::new();
        rules.set_hook(Arc::new(|r: &FileRecord| r.is_dir));
        let listing = scan(&root, &ScanOptions::recursive(), &rules).unwrap();
        assert!(listing.records.iter().all(|r| r.is_dir));
        assert_eq!(listing.records.len(), 2);
    }

    #[test]
    fn hidden_entries_can_be_skipped() {
        let (_tmp, root) = fixture();
        fs::write(root.join(".hidden"), b"").unwrap();

        let shown = scan(&root, &ScanOptions::default(), &IgnoreRules::default()).unwrap();
        assert!(shown.records.iter().any(|r| r.name == ".hidden"));

        let options = ScanOptions {
            skip_hidden: true,
            ..ScanOptions::default()
        };
        let hidden = scan(&root, &options, &IgnoreRules::default()).unwrap();
        assert!(hidden.records.iter().all(|r| r.name != ".hidden"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_recorded_not_followed() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let target = tmp.path().join("target_dir");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&target).unwrap();
        fs::write(target.join("inner.txt"), b"inside").unwrap();
        std::os::unix::fs::symlink("../target_dir", root.join("link")).unwrap();

        let listing = scan(&root, &ScanOptions::recursive(), &IgnoreRules::default()).unwrap();

        assert!(listing.errors.is_empty());
        let links: Vec<_> = listing.records.iter().filter(|r| r.name == "link").collect();
        assert_eq!(links.len(), 1);
        assert!(!links[0].is_dir);
        assert!(listing.records.iter().all(|r| r.name != "inner.txt"));
        assert_eq!(listing.records.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_reported_and_siblings_survive() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, root) = fixture();
        let locked = root.join("test_folder_recursive");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users read through mode bits; nothing to observe then.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let listing = scan(&root, &ScanOptions::recursive(), &IgnoreRules::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let listing = listing.unwrap();

        assert!(!listing.errors.is_empty());
        assert!(listing
            .errors
            .iter()
            .all(|e| matches!(e, WatchError::Listing { .. })));
        let names: Vec<_> = listing.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["test_folder", "file.txt", "test_folder_recursive"]);
    }
}
