//! LRU-bounded, debounced directory watching.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::WatcherConfig;
use crate::error::{WatchError, WatchResult};
use crate::events::{DirectoryEntry, WatchEvent, WatcherStats};
use crate::scanner::{scan_directories, sorted_entries};

struct WatchedDir {
    entries: HashMap<String, DirectoryEntry>,
    last_accessed: Instant,
}

struct Inner {
    watcher: RecommendedWatcher,
    watches: HashMap<PathBuf, WatchedDir>,
    /// Debounce timers in flight, keyed by watched directory.
    pending_rescans: HashMap<PathBuf, JoinHandle<()>>,
    shutdown: bool,
}

/// Watches a bounded set of directories non-recursively.
///
/// Raw notifications are coalesced per directory within a debounce window,
/// then translated into semantic [`WatchEvent`]s by diffing a fresh scan
/// against the cached entry map. When the configured capacity is reached,
/// the least-recently-accessed watch is evicted to make room.
///
/// Must be constructed inside a tokio runtime; debounce timers and the
/// raw-event pump run as tasks.
pub struct DirectoryWatcher {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<WatchEvent>,
    config: WatcherConfig,
    pump: JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Create a watcher delivering events on the returned channel.
    pub fn new(
        config: WatcherConfig,
    ) -> WatchResult<(Self, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = raw_tx.send(result);
        })
        .map_err(|error| WatchError::Setup {
            path: PathBuf::new(),
            message: error.to_string(),
        })?;

        let inner = Arc::new(Mutex::new(Inner {
            watcher,
            watches: HashMap::new(),
            pending_rescans: HashMap::new(),
            shutdown: false,
        }));

        let pump = tokio::spawn(pump_raw_events(
            raw_rx,
            inner.clone(),
            events_tx.clone(),
            config.debounce,
        ));

        Ok((
            Self {
                inner,
                events: events_tx,
                config,
                pump,
            },
            events_rx,
        ))
    }

    /// Watch `path`, returning its current entry listing.
    ///
    /// An already-watched path has its last-accessed time refreshed and its
    /// cached listing returned without touching the filesystem. At capacity
    /// the least-recently-accessed watch is evicted first. Scan or native
    /// watch failures emit a [`WatchEvent::Error`] and leave the path
    /// unwatched.
    pub fn watch_directory(&self, path: &Path) -> WatchResult<Vec<DirectoryEntry>> {
        let path = path.to_path_buf();
        let mut inner = self.inner.lock();

        if let Some(watched) = inner.watches.get_mut(&path) {
            watched.last_accessed = Instant::now();
            return Ok(sorted_entries(&watched.entries));
        }

        if inner.watches.len() >= self.config.max_watched_dirs {
            if let Some(evicted) = lru_candidate(&inner.watches) {
                debug!(path = %evicted.display(), "evicting least-recently-accessed watch");
                remove_watch(&mut inner, &evicted);
                let _ = self.events.send(WatchEvent::Evicted { dir: evicted });
            }
        }

        let entries = match scan_directories(&path) {
            Ok(entries) => entries,
            Err(error) => {
                let _ = self.events.send(WatchEvent::Error {
                    dir: path.clone(),
                    message: error.to_string(),
                });
                return Err(error);
            }
        };

        if let Err(error) = inner.watcher.watch(&path, RecursiveMode::NonRecursive) {
            let _ = self.events.send(WatchEvent::Error {
                dir: path.clone(),
                message: error.to_string(),
            });
            return Err(WatchError::Setup {
                path,
                message: error.to_string(),
            });
        }

        let listing = sorted_entries(&entries);
        inner.watches.insert(
            path.clone(),
            WatchedDir {
                entries,
                last_accessed: Instant::now(),
            },
        );
        drop(inner);

        self.spawn_existence_check(path);
        Ok(listing)
    }

    /// Force an immediate rescan-and-diff of a watched directory, skipping
    /// any debounce timer in flight. Unwatched paths are ignored.
    pub fn rescan(&self, path: &Path) {
        {
            let mut inner = self.inner.lock();
            if let Some(handle) = inner.pending_rescans.remove(path) {
                handle.abort();
            }
        }
        rescan_now(&self.inner, &self.events, path);
    }

    /// Stop watching `path` and drop its cached entries.
    pub fn unwatch_directory(&self, path: &Path) {
        let mut inner = self.inner.lock();
        remove_watch(&mut inner, path);
    }

    /// Stop watching everything.
    pub fn unwatch_all(&self) {
        let mut inner = self.inner.lock();
        let paths: Vec<PathBuf> = inner.watches.keys().cloned().collect();
        for path in paths {
            remove_watch(&mut inner, &path);
        }
    }

    /// Cached listing for a watched directory, without refreshing its
    /// last-accessed time.
    pub fn entries(&self, path: &Path) -> Option<Vec<DirectoryEntry>> {
        let inner = self.inner.lock();
        inner
            .watches
            .get(path)
            .map(|watched| sorted_entries(&watched.entries))
    }

    /// Whether `path` is currently watched.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.inner.lock().watches.contains_key(path)
    }

    /// Watcher occupancy.
    pub fn stats(&self) -> WatcherStats {
        let inner = self.inner.lock();
        let watched_count = inner.watches.len();
        WatcherStats {
            watched_count,
            max_watched: self.config.max_watched_dirs,
            is_at_limit: watched_count >= self.config.max_watched_dirs,
        }
    }

    fn spawn_existence_check(&self, path: PathBuf) {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let delay = self.config.existence_check_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if path.is_dir() {
                return;
            }
            let mut guard = inner.lock();
            if guard.shutdown || !guard.watches.contains_key(&path) {
                return;
            }
            remove_watch(&mut guard, &path);
            drop(guard);
            let _ = events.send(WatchEvent::Deleted { dir: path });
        });
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        for (_, handle) in inner.pending_rescans.drain() {
            handle.abort();
        }
        self.pump.abort();
    }
}

fn lru_candidate(watches: &HashMap<PathBuf, WatchedDir>) -> Option<PathBuf> {
    watches
        .iter()
        .min_by_key(|(_, watched)| watched.last_accessed)
        .map(|(path, _)| path.clone())
}

/// Remove a watch and cancel its debounce timer. Callers emit whatever
/// notification fits the reason for removal.
fn remove_watch(inner: &mut Inner, path: &Path) {
    if inner.watches.remove(path).is_some() {
        if let Err(error) = inner.watcher.unwatch(path) {
            debug!(path = %path.display(), %error, "native unwatch failed");
        }
    }
    if let Some(handle) = inner.pending_rescans.remove(path) {
        handle.abort();
    }
}

async fn pump_raw_events(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<WatchEvent>,
    debounce: Duration,
) {
    while let Some(result) = raw_rx.recv().await {
        match result {
            Ok(event) => route_raw_event(&inner, &events, debounce, event),
            Err(error) => {
                let paths = error.paths.clone();
                if paths.is_empty() {
                    warn!(%error, "watch backend error without a path");
                    continue;
                }
                let mut failed = Vec::new();
                {
                    let mut guard = inner.lock();
                    if guard.shutdown {
                        return;
                    }
                    for path in paths {
                        if guard.watches.contains_key(&path) {
                            remove_watch(&mut guard, &path);
                            failed.push(path);
                        }
                    }
                }
                for path in failed {
                    let _ = events.send(WatchEvent::Error {
                        dir: path,
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}

/// Schedule a debounced rescan for every watched directory a raw event
/// touches. Events for a path already pending are dropped; the rescan at
/// the end of the window reads the final on-disk state.
fn route_raw_event(
    inner: &Arc<Mutex<Inner>>,
    events: &mpsc::UnboundedSender<WatchEvent>,
    debounce: Duration,
    event: Event,
) {
    let mut guard = inner.lock();
    if guard.shutdown {
        return;
    }
    for path in &event.paths {
        let dir = if guard.watches.contains_key(path.as_path()) {
            path.clone()
        } else {
            match path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => continue,
            }
        };
        if !guard.watches.contains_key(&dir) || guard.pending_rescans.contains_key(&dir) {
            continue;
        }
        let handle = spawn_debounced_rescan(inner.clone(), events.clone(), dir.clone(), debounce);
        guard.pending_rescans.insert(dir, handle);
    }
}

fn spawn_debounced_rescan(
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<WatchEvent>,
    dir: PathBuf,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        {
            let mut guard = inner.lock();
            guard.pending_rescans.remove(&dir);
            if guard.shutdown {
                return;
            }
        }
        rescan_now(&inner, &events, &dir);
    })
}

/// Diff a fresh scan against the cached entry map and emit the resulting
/// semantic events. A failed scan tears the watch down: `Deleted` when the
/// directory is gone, `Error` otherwise.
fn rescan_now(
    inner: &Arc<Mutex<Inner>>,
    events: &mpsc::UnboundedSender<WatchEvent>,
    dir: &Path,
) {
    let scanned = scan_directories(dir);
    let mut guard = inner.lock();
    if guard.shutdown {
        return;
    }
    let Some(watched) = guard.watches.get_mut(dir) else {
        return;
    };
    match scanned {
        Ok(new_entries) => {
            let changes = diff_entries(&watched.entries, &new_entries, dir);
            watched.entries = new_entries;
            drop(guard);
            for change in changes {
                let _ = events.send(change);
            }
        }
        Err(error) => {
            remove_watch(&mut guard, dir);
            drop(guard);
            if dir.exists() {
                let _ = events.send(WatchEvent::Error {
                    dir: dir.to_path_buf(),
                    message: error.to_string(),
                });
            } else {
                let _ = events.send(WatchEvent::Deleted {
                    dir: dir.to_path_buf(),
                });
            }
        }
    }
}

fn diff_entries(
    old: &HashMap<String, DirectoryEntry>,
    new: &HashMap<String, DirectoryEntry>,
    dir: &Path,
) -> Vec<WatchEvent> {
    let mut changes = Vec::new();
    for (name, entry) in new {
        match old.get(name) {
            None => changes.push(WatchEvent::Added {
                dir: dir.to_path_buf(),
                entry: entry.clone(),
            }),
            Some(previous) if previous.modified_ms != entry.modified_ms => {
                changes.push(WatchEvent::Changed {
                    dir: dir.to_path_buf(),
                    entry: entry.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            changes.push(WatchEvent::Removed {
                dir: dir.to_path_buf(),
                name: name.clone(),
            });
        }
    }
    changes.sort_by(|a, b| change_name(a).cmp(change_name(b)));
    changes
}

fn change_name(event: &WatchEvent) -> &str {
    match event {
        WatchEvent::Added { entry, .. } | WatchEvent::Changed { entry, .. } => &entry.name,
        WatchEvent::Removed { name, .. } => name,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn test_config() -> WatcherConfig {
        WatcherConfig {
            max_watched_dirs: 2,
            debounce: Duration::from_millis(100),
            existence_check_delay: Duration::from_millis(100),
        }
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<WatchEvent>,
    ) -> Option<WatchEvent> {
        timeout(Duration::from_secs(3), rx.recv()).await.ok()?
    }

    #[tokio::test]
    async fn watch_returns_sorted_entries() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("beta")).expect("mkdir");
        std::fs::create_dir(dir.path().join("alpha")).expect("mkdir");

        let (watcher, _rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        let entries = watcher.watch_directory(dir.path()).expect("watch");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "alpha");
        assert_eq!(entries[1].name, "beta");
        assert!(watcher.is_watching(dir.path()));
    }

    #[tokio::test]
    async fn rewatch_returns_cached_listing() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("only")).expect("mkdir");

        let (watcher, _rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        let first = watcher.watch_directory(dir.path()).expect("watch");
        let second = watcher.watch_directory(dir.path()).expect("rewatch");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_accessed() {
        let root = tempdir().expect("tempdir");
        let a = root.path().join("a");
        let b = root.path().join("b");
        let c = root.path().join("c");
        for path in [&a, &b, &c] {
            std::fs::create_dir(path).expect("mkdir");
        }

        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(&a).expect("watch a");
        watcher.watch_directory(&b).expect("watch b");
        // Refresh `a` so `b` becomes the LRU candidate.
        watcher.watch_directory(&a).expect("refresh a");
        watcher.watch_directory(&c).expect("watch c");

        let event = next_event(&mut rx).await.expect("evicted event");
        assert_eq!(event, WatchEvent::Evicted { dir: b.clone() });
        assert!(!watcher.is_watching(&b));
        assert!(watcher.is_watching(&a));
        assert!(watcher.is_watching(&c));
    }

    #[tokio::test]
    async fn stats_reflect_capacity() {
        let root = tempdir().expect("tempdir");
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir(&a).expect("mkdir");
        std::fs::create_dir(&b).expect("mkdir");

        let (watcher, _rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        assert!(!watcher.stats().is_at_limit);

        watcher.watch_directory(&a).expect("watch a");
        assert_eq!(watcher.stats().watched_count, 1);
        assert!(!watcher.stats().is_at_limit);

        watcher.watch_directory(&b).expect("watch b");
        let stats = watcher.stats();
        assert_eq!(stats.watched_count, 2);
        assert_eq!(stats.max_watched, 2);
        assert!(stats.is_at_limit);
    }

    #[tokio::test]
    async fn rescan_emits_semantic_diff() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("keep")).expect("mkdir");
        std::fs::create_dir(dir.path().join("drop")).expect("mkdir");

        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(dir.path()).expect("watch");

        std::fs::remove_dir(dir.path().join("drop")).expect("rmdir");
        std::fs::create_dir(dir.path().join("fresh")).expect("mkdir");
        watcher.rescan(dir.path());

        let mut added = 0;
        let mut removed = 0;
        for _ in 0..2 {
            match next_event(&mut rx).await.expect("event") {
                WatchEvent::Added { entry, .. } => {
                    assert_eq!(entry.name, "fresh");
                    added += 1;
                }
                WatchEvent::Removed { name, .. } => {
                    assert_eq!(name, "drop");
                    removed += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!((added, removed), (1, 1));
    }

    #[tokio::test]
    async fn native_events_coalesce_into_one_diff() {
        let dir = tempdir().expect("tempdir");
        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(dir.path()).expect("watch");

        // A burst of changes to the same entry within the debounce window:
        // created, removed, created again. Only the final state should be
        // reported.
        let churn = dir.path().join("churn");
        std::fs::create_dir(&churn).expect("mkdir");
        std::fs::remove_dir(&churn).expect("rmdir");
        std::fs::create_dir(&churn).expect("mkdir again");

        let event = next_event(&mut rx).await.expect("debounced event");
        assert!(
            matches!(&event, WatchEvent::Added { entry, .. } if entry.name == "churn"),
            "unexpected event {event:?}"
        );

        // No further event for the burst once the window closed.
        let extra = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(extra.is_err(), "unexpected extra event {extra:?}");
    }

    #[tokio::test]
    async fn deleted_directory_reports_and_unwatches() {
        let root = tempdir().expect("tempdir");
        let target = root.path().join("target");
        std::fs::create_dir(&target).expect("mkdir");

        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(&target).expect("watch");

        std::fs::remove_dir(&target).expect("rmdir");
        watcher.rescan(&target);

        let event = next_event(&mut rx).await.expect("deleted event");
        assert_eq!(event, WatchEvent::Deleted { dir: target.clone() });
        assert!(!watcher.is_watching(&target));
    }

    #[tokio::test]
    async fn existence_check_catches_prompt_deletion() {
        let root = tempdir().expect("tempdir");
        let target = root.path().join("target");
        std::fs::create_dir(&target).expect("mkdir");

        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(&target).expect("watch");
        std::fs::remove_dir(&target).expect("rmdir");

        // Either the native remove event or the existence check must
        // surface the deletion.
        let event = next_event(&mut rx).await.expect("deleted event");
        assert_eq!(event, WatchEvent::Deleted { dir: target.clone() });
        assert!(!watcher.is_watching(&target));
    }

    #[tokio::test]
    async fn unwatch_stops_notifications() {
        let dir = tempdir().expect("tempdir");
        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(dir.path()).expect("watch");
        watcher.unwatch_directory(dir.path());
        assert!(!watcher.is_watching(dir.path()));

        std::fs::create_dir(dir.path().join("late")).expect("mkdir");
        let extra = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(extra.is_err(), "unexpected event {extra:?}");
    }

    #[tokio::test]
    async fn unwatch_all_clears_everything() {
        let root = tempdir().expect("tempdir");
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir(&a).expect("mkdir");
        std::fs::create_dir(&b).expect("mkdir");

        let (watcher, _rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        watcher.watch_directory(&a).expect("watch a");
        watcher.watch_directory(&b).expect("watch b");
        watcher.unwatch_all();
        assert_eq!(watcher.stats().watched_count, 0);
    }

    #[tokio::test]
    async fn watching_a_file_fails_with_error_event() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "data").expect("write");

        let (watcher, mut rx) = DirectoryWatcher::new(test_config()).expect("watcher");
        let result = watcher.watch_directory(&file);
        assert!(result.is_err());
        assert!(!watcher.is_watching(&file));

        let event = next_event(&mut rx).await.expect("error event");
        assert!(matches!(event, WatchEvent::Error { dir, .. } if dir == file));
    }

    #[test]
    fn diff_reports_changed_modification_time() {
        let dir = PathBuf::from("/watched");
        let old_entry = DirectoryEntry {
            name: "src".to_string(),
            path: dir.join("src"),
            modified_ms: Some(1),
        };
        let mut new_entry = old_entry.clone();
        new_entry.modified_ms = Some(2);

        let old = HashMap::from([("src".to_string(), old_entry)]);
        let new = HashMap::from([("src".to_string(), new_entry.clone())]);

        let changes = diff_entries(&old, &new, &dir);
        assert_eq!(
            changes,
            vec![WatchEvent::Changed {
                dir,
                entry: new_entry
            }]
        );
    }

    #[test]
    fn diff_is_empty_for_identical_maps() {
        let dir = PathBuf::from("/watched");
        let entry = DirectoryEntry {
            name: "src".to_string(),
            path: dir.join("src"),
            modified_ms: Some(1),
        };
        let map = HashMap::from([("src".to_string(), entry)]);
        assert!(diff_entries(&map, &map, &dir).is_empty());
    }
}
