/// Ignore rules: exclusion criteria applied to every listing and diff.
///
/// Two kinds of rule exist:
/// - explicit paths: the path and everything beneath it is excluded;
/// - an optional inclusion hook: records for which it returns `false` are
///   excluded.
///
/// Explicit paths are compared in absolute form so that a rule added as
/// `./build` matches records reached through `build/...` and vice versa.
use crate::model::FileRecord;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inclusion predicate over a [`FileRecord`].
pub type FilterHook = Arc<dyn Fn(&FileRecord) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct IgnoreRules {
    paths: Vec<PathBuf>,
    hook: Option<FilterHook>,
}

impl IgnoreRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude `path` and its descendants.
    ///
    /// Fails only if the path cannot be made absolute (e.g. it is empty or the
    /// working directory is gone).
    pub fn ignore_path(&mut self, path: &Path) -> io::Result<()> {
        let abs = std::path::absolute(path)?;
        if !self.paths.contains(&abs) {
            self.paths.push(abs);
        }
        Ok(())
    }

    pub fn set_hook(&mut self, hook: FilterHook) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    pub fn ignored_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// `true` if `path` equals or lies beneath an ignored path.
    pub fn is_path_ignored(&self, path: &Path) -> bool {
        if self.paths.is_empty() {
            return false;
        }
        match std::path::absolute(path) {
            Ok(abs) => self.paths.iter().any(|ignored| abs.starts_with(ignored)),
            Err(_) => false,
        }
    }

    /// `true` if the inclusion hook (if any) accepts `record`.
    pub fn passes_hook(&self, record: &FileRecord) -> bool {
        match &self.hook {
            Some(hook) => hook(record),
            None => true,
        }
    }

    /// `true` if `record` survives every rule.
    pub fn admits(&self, record: &FileRecord) -> bool {
        !self.is_path_ignored(&record.path) && self.passes_hook(record)
    }
}

impl fmt::Debug for IgnoreRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreRules")
            .field("paths", &self.paths)
            .field("hook", &self.hook.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
