/// `jwalk`-based traversal below a listing root.
///
/// `sort(true)` makes the output order independent of the parallelism
/// setting: the serial walker and a rayon pool produce the same sequence, and
/// every directory precedes its contents.
use super::{Listing, ScanOptions};
use crate::error::WatchError;
use crate::filter::IgnoreRules;
use crate::model::file_record::display_name;
use crate::model::FileRecord;
use std::path::Path;
use std::sync::Arc;
use tracing::{trace, warn};

/// Append a record for every entry below `root` to `listing`.
///
/// `root` itself is skipped; the caller has already recorded it.
pub(super) fn walk_children(
    root: &Path,
    options: &ScanOptions,
    rules: &IgnoreRules,
    listing: &mut Listing,
) {
    let parallelism = match &options.pool {
        Some(pool) => jwalk::Parallelism::RayonExistingPool {
            pool: Arc::clone(pool),
            busy_timeout: None,
        },
        None => jwalk::Parallelism::Serial,
    };
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let walker = jwalk::WalkDir::new(root)
        .sort(true)
        .skip_hidden(options.skip_hidden)
        .follow_links(false)
        .max_depth(max_depth)
        .parallelism(parallelism);

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                // Failures reading an entry out of its directory.
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                warn!("Listing error under {}: {err}", root.display());
                listing.errors.push(WatchError::listing(path, &err));
                continue;
            }
        };

        let path = entry.path();
        if entry.depth > 0 && rules.is_path_ignored(&path) {
            trace!("Ignored {}", path.display());
            continue;
        }

        // jwalk attaches a failed `read_dir` to the directory's own entry.
        if let Some(err) = &entry.read_children_error {
            warn!("Could not read {}: {err}", path.display());
            listing.errors.push(WatchError::listing(path.clone(), err));
        }

        if entry.depth == 0 {
            continue;
        }

        let dir = path.parent().map(display_name).unwrap_or_default();

        // Symlinks are recorded as links, never followed.
        let record = match FileRecord::stat(path, dir) {
            Ok(record) => record,
            Err(err) => {
                let path = entry.path();
                warn!("Could not stat {}: {err}", path.display());
                listing.errors.push(WatchError::listing(path, err));
                continue;
            }
        };

        if rules.passes_hook(&record) {
            listing.records.push(record);
        }
    }
}
