//! Non-recursive directory scanning.

use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::error::{WatchError, WatchResult};
use crate::events::DirectoryEntry;

/// Scan `path` non-recursively, keyed by entry name.
///
/// Only directories are returned; entries whose names begin with a dot are
/// skipped. Entries whose metadata cannot be read are skipped rather than
/// failing the whole scan.
pub fn scan_directories(path: &Path) -> WatchResult<HashMap<String, DirectoryEntry>> {
    if !path.is_dir() {
        return Err(WatchError::NotADirectory(path.to_path_buf()));
    }

    let mut entries = HashMap::new();
    for entry in std::fs::read_dir(path)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let modified_ms = entry
            .metadata()
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64);
        entries.insert(
            name.clone(),
            DirectoryEntry {
                name,
                path: entry.path(),
                modified_ms,
            },
        );
    }
    Ok(entries)
}

/// Entry map as a name-sorted list, for handing listings to callers.
pub(crate) fn sorted_entries(entries: &HashMap<String, DirectoryEntry>) -> Vec<DirectoryEntry> {
    let mut listing: Vec<DirectoryEntry> = entries.values().cloned().collect();
    listing.sort_by(|a, b| a.name.cmp(&b.name));
    listing
}
