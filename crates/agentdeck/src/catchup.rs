//! Catch-up planning for reconnecting clients.

use serde::Serialize;

use crate::state::{ClientId, Version};

/// A connected client whose acknowledged version is behind the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleClient {
    pub client_id: ClientId,
    pub last_ack_version: Version,
}

/// How a stale client should be brought current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPlan {
    /// Replay the missed mutations in order.
    Deltas,
    /// Send a fresh snapshot and let the client acknowledge its version.
    Snapshot,
}

/// Snapshot when the client is further behind than `snapshot_threshold`
/// versions; deltas otherwise. A client at version 0 (freshly registered)
/// always gets a snapshot.
pub fn plan_catch_up(
    last_ack_version: Version,
    current_version: Version,
    snapshot_threshold: u64,
) -> CatchUpPlan {
    if last_ack_version == 0 {
        return CatchUpPlan::Snapshot;
    }
    if current_version.saturating_sub(last_ack_version) > snapshot_threshold {
        CatchUpPlan::Snapshot
    } else {
        CatchUpPlan::Deltas
    }
}
