use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use dirwatch::WatcherConfig;

/// Engine tuning. All fields have working defaults; a config file only
/// needs the values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// A full workspace snapshot is written every Nth global version.
    /// Zero disables periodic snapshots.
    pub snapshot_interval: u64,
    /// Catch-up switches from deltas to a snapshot beyond this gap.
    pub catch_up_snapshot_threshold: u64,
    pub vacuum: VacuumConfig,
    pub watcher: WatcherSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VacuumConfig {
    pub interval_secs: u64,
    pub keep_snapshots: usize,
    pub keep_delta_generations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSettings {
    pub max_watched_dirs: usize,
    pub debounce_ms: u64,
    pub existence_check_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("agentdeck.db"),
            snapshot_interval: 100,
            catch_up_snapshot_threshold: 200,
            vacuum: VacuumConfig::default(),
            watcher: WatcherSettings::default(),
        }
    }
}

impl Default for VacuumConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            keep_snapshots: 3,
            keep_delta_generations: 100,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            max_watched_dirs: 64,
            debounce_ms: 200,
            existence_check_delay_ms: 500,
        }
    }
}

impl WatcherSettings {
    pub fn to_watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            max_watched_dirs: self.max_watched_dirs,
            debounce: Duration::from_millis(self.debounce_ms),
            existence_check_delay: Duration::from_millis(self.existence_check_delay_ms),
        }
    }
}
