/// Snapshot differ: classifies each path as added, modified or removed.
///
/// Events come out in discovery order: first a pass over `current` (added and
/// modified entries, in listing order), then a pass over `previous` for
/// entries that disappeared (in baseline order). Each path yields at most one
/// event.
///
/// Directories are compared exactly like files. Creating a file inside a
/// watched directory usually bumps the directory's mtime, so the tick that
/// first sees the new child reports `Modified` for the directory *before*
/// `Added` for the child. Both events are intentional; callers that only care
/// about leaf entries filter directory events themselves.
use crate::events::{ChangeEvent, EventKind};
use crate::model::Snapshot;
use chrono::Local;

/// Compare `previous` with `current`.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    let detected_at = Local::now();
    let mut events = Vec::new();

    for record in current.iter() {
        match previous.get(&record.path) {
            None => events.push(ChangeEvent::new(EventKind::Added, record.clone(), detected_at)),
            Some(old) if !old.same_state(record) => {
                events.push(ChangeEvent::new(
                    EventKind::Modified,
                    record.clone(),
                    detected_at,
                ));
            }
            Some(_) => {}
        }
    }

    for record in previous.iter() {
        if !current.contains(&record.path) {
            events.push(ChangeEvent::new(
                EventKind::Removed,
                record.clone(),
                detected_at,
            ));
        }
    }

    events
}
