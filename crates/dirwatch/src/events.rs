//! Semantic watch events and the entry/stats types they carry.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single subdirectory produced by a non-recursive scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: PathBuf,
    /// Last-modified time in milliseconds since the unix epoch.
    pub modified_ms: Option<u64>,
}

/// Watcher occupancy, surfaced into workspace state so the UI can indicate
/// saturation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStats {
    pub watched_count: usize,
    pub max_watched: usize,
    pub is_at_limit: bool,
}

/// A change notification for a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEvent {
    /// A subdirectory appeared in a watched directory.
    Added { dir: PathBuf, entry: DirectoryEntry },
    /// An existing subdirectory's modification time moved.
    Changed { dir: PathBuf, entry: DirectoryEntry },
    /// A subdirectory disappeared from a watched directory.
    Removed { dir: PathBuf, name: String },
    /// The watched directory itself no longer exists; the watch was
    /// torn down.
    Deleted { dir: PathBuf },
    /// The watch was evicted to make room for a new one.
    Evicted { dir: PathBuf },
    /// The watch failed and was torn down.
    Error { dir: PathBuf, message: String },
}

impl WatchEvent {
    /// The watched directory this event concerns.
    pub fn dir(&self) -> &Path {
        match self {
            WatchEvent::Added { dir, .. }
            | WatchEvent::Changed { dir, .. }
            | WatchEvent::Removed { dir, .. }
            | WatchEvent::Deleted { dir }
            | WatchEvent::Evicted { dir }
            | WatchEvent::Error { dir, .. } => dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_accessor_covers_all_variants() {
        let dir = PathBuf::from("/tmp/project");
        let entry = DirectoryEntry {
            name: "src".to_string(),
            path: dir.join("src"),
            modified_ms: Some(1_000),
        };

        let events = vec![
            WatchEvent::Added {
                dir: dir.clone(),
                entry: entry.clone(),
            },
            WatchEvent::Changed {
                dir: dir.clone(),
                entry,
            },
            WatchEvent::Removed {
                dir: dir.clone(),
                name: "src".to_string(),
            },
            WatchEvent::Deleted { dir: dir.clone() },
            WatchEvent::Evicted { dir: dir.clone() },
            WatchEvent::Error {
                dir: dir.clone(),
                message: "denied".to_string(),
            },
        ];

        for event in events {
            assert_eq!(event.dir(), dir.as_path());
        }
    }

    #[test]
    fn entry_serialize_roundtrip() {
        let entry = DirectoryEntry {
            name: "docs".to_string(),
            path: PathBuf::from("/tmp/project/docs"),
            modified_ms: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: DirectoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }
}
