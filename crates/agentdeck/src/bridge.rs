//! Feeds directory-watch activity into the mutation store.
//!
//! The watcher speaks semantic filesystem events; the engine speaks
//! mutations. This module is the translation between the two: opening a
//! directory in the file tree becomes a watch plus the mutations that
//! record it, and every subsequent watch event becomes the mutation that
//! keeps the workspace's file-tree cache current.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use dirwatch::{DirectoryWatcher, WatchEvent};

use crate::engine::SyncEngine;
use crate::error::{EngineError, EngineResult};
use crate::mutation::Mutation;
use crate::state::WorkspaceId;

/// Watch `path` for a workspace and record the watch, its entry listing,
/// and the new watcher occupancy as mutations. Failures are recorded as a
/// directory-watch-error mutation and surfaced to the caller.
pub fn watch_and_record(
    engine: &SyncEngine,
    watcher: &DirectoryWatcher,
    workspace_id: &str,
    path: &Path,
) -> EngineResult<Vec<dirwatch::DirectoryEntry>> {
    let path_string = path.to_string_lossy().into_owned();
    match watcher.watch_directory(path) {
        Ok(entries) => {
            engine.mutate(Mutation::WatchedDirectoryAdd {
                workspace_id: workspace_id.to_string(),
                path: path_string.clone(),
            })?;
            engine.mutate(Mutation::DirectoryEntriesUpdate {
                workspace_id: workspace_id.to_string(),
                path: path_string,
                entries: entries.clone(),
            })?;
            engine.mutate(Mutation::WatcherStatsUpdate {
                workspace_id: workspace_id.to_string(),
                stats: watcher.stats(),
            })?;
            Ok(entries)
        }
        Err(error) => {
            engine.mutate(Mutation::DirectoryWatchError {
                workspace_id: workspace_id.to_string(),
                path: path_string,
                message: error.to_string(),
            })?;
            Err(EngineError::Watch(error.to_string()))
        }
    }
}

/// Pump watcher events into the store for one workspace until the watcher
/// side of the channel closes or the engine is disposed.
pub fn spawn_watch_bridge(
    engine: Arc<SyncEngine>,
    watcher: Arc<DirectoryWatcher>,
    workspace_id: WorkspaceId,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match record_watch_event(&engine, &watcher, &workspace_id, event) {
                Ok(()) => {}
                Err(EngineError::Disposed) => break,
                Err(error) => warn!(%error, "failed to record watch event"),
            }
        }
    })
}

/// Translate one watch event into the mutations that keep workspace state
/// current.
pub(crate) fn record_watch_event(
    engine: &SyncEngine,
    watcher: &DirectoryWatcher,
    workspace_id: &str,
    event: WatchEvent,
) -> EngineResult<()> {
    let path = event.dir().to_string_lossy().into_owned();
    match event {
        WatchEvent::Added { dir, .. }
        | WatchEvent::Changed { dir, .. }
        | WatchEvent::Removed { dir, .. } => {
            // The watcher already refreshed its cache; mirror the listing
            // into the workspace's file tree.
            let entries = watcher.entries(&dir).unwrap_or_default();
            engine.mutate(Mutation::DirectoryEntriesUpdate {
                workspace_id: workspace_id.to_string(),
                path,
                entries,
            })?;
        }
        WatchEvent::Deleted { .. } | WatchEvent::Evicted { .. } => {
            engine.mutate(Mutation::WatchedDirectoryRemove {
                workspace_id: workspace_id.to_string(),
                path,
            })?;
            engine.mutate(Mutation::WatcherStatsUpdate {
                workspace_id: workspace_id.to_string(),
                stats: watcher.stats(),
            })?;
        }
        WatchEvent::Error { message, .. } => {
            engine.mutate(Mutation::DirectoryWatchError {
                workspace_id: workspace_id.to_string(),
                path,
                message,
            })?;
            engine.mutate(Mutation::WatcherStatsUpdate {
                workspace_id: workspace_id.to_string(),
                stats: watcher.stats(),
            })?;
        }
    }
    Ok(())
}
