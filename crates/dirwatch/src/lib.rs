//! Scoped directory watching.
//!
//! This crate watches a bounded set of directories non-recursively:
//! - raw OS notifications are coalesced per directory within a debounce
//!   window, then translated into semantic add/change/remove events by
//!   diffing a fresh scan against the cached entry map
//! - the least-recently-accessed watch is evicted when the configured
//!   capacity is reached
//! - watch failures and deleted directories tear the watch down with a
//!   notification instead of failing the process

mod config;
mod error;
mod events;
mod scanner;
mod watcher;

pub use config::WatcherConfig;
pub use error::{WatchError, WatchResult};
pub use events::{DirectoryEntry, WatchEvent, WatcherStats};
pub use scanner::scan_directories;
pub use watcher::DirectoryWatcher;
