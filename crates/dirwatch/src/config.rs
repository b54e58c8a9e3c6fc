use std::time::Duration;

/// Tuning for [`crate::DirectoryWatcher`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Maximum number of directories watched at once.
    pub max_watched_dirs: usize,
    /// Window over which raw change notifications for one directory are
    /// coalesced into a single rescan.
    pub debounce: Duration,
    /// Delay before re-checking that a freshly watched directory still
    /// exists. Catches directories deleted right after the watch was set
    /// up, where some platforms drop the native watch without an event.
    pub existence_check_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_watched_dirs: 64,
            debounce: Duration::from_millis(200),
            existence_check_delay: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_bounded() {
        let config = WatcherConfig::default();
        assert!(config.max_watched_dirs > 0);
        assert!(config.debounce > Duration::ZERO);
    }
}
