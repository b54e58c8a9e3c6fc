//! Durable persistence for deltas, snapshots, and client acknowledgments.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use types::{
    decode_snapshot, encode_snapshot, ClientRecord, DecodedDelta, DeltaPayload, DeltaRecord,
    SnapshotRecord,
};

use crate::error::EngineResult;
use crate::state::{Version, WorkspaceId};

/// Append-only delta/snapshot persistence with client-ack bookkeeping.
///
/// Implementations must be safe to share across threads: the engine
/// serializes writes itself, but retention vacuum runs on its own task and
/// reads may come from transport handlers.
pub trait SyncStorage: Send + Sync {
    /// Durably append one delta. Versions are globally unique.
    fn store_delta(
        &self,
        workspace_id: &str,
        version: Version,
        previous_version: Version,
        payload: &[u8],
    ) -> EngineResult<()>;

    /// All deltas for a workspace with version strictly greater than
    /// `since_version`, ascending.
    fn deltas_since(
        &self,
        workspace_id: &str,
        since_version: Version,
    ) -> EngineResult<Vec<DeltaRecord>>;

    /// Durably store a full workspace snapshot, replacing any previous one
    /// at the same version.
    fn store_snapshot(
        &self,
        workspace_id: &str,
        version: Version,
        payload: &[u8],
    ) -> EngineResult<()>;

    /// Snapshot at exactly `version`, if one was written there.
    fn snapshot_at(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>>;

    /// Most recent snapshot at or before `version`.
    fn snapshot_at_or_before(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>>;

    /// Most recent snapshot for the workspace.
    fn latest_snapshot(&self, workspace_id: &str) -> EngineResult<Option<SnapshotRecord>>;

    /// Highest version present in the delta log, across all workspaces.
    fn latest_version(&self) -> EngineResult<Version>;

    /// Every workspace with at least one delta or snapshot on record.
    fn workspace_ids(&self) -> EngineResult<Vec<WorkspaceId>>;

    /// Record a newly connected client at acknowledged version 0.
    /// Re-registering an existing client resets its position.
    fn register_client(&self, client_id: &str, workspace_id: &str) -> EngineResult<()>;

    /// Advance a client's acknowledged version. Acknowledgments below the
    /// recorded position are ignored.
    fn update_client_ack(&self, client_id: &str, version: Version) -> EngineResult<()>;

    /// Forget a disconnected client.
    fn remove_client(&self, client_id: &str) -> EngineResult<()>;

    /// All clients registered against a workspace.
    fn workspace_clients(&self, workspace_id: &str) -> EngineResult<Vec<ClientRecord>>;

    /// Retention compaction: per workspace, keep only the newest
    /// `keep_snapshots` snapshots, and prune deltas trailing the oldest
    /// retained snapshot by more than `keep_delta_generations` versions.
    /// Rows at or newer than the oldest retained recovery point are never
    /// deleted, so every retained snapshot can still roll forward.
    fn vacuum(&self, keep_snapshots: usize, keep_delta_generations: u64) -> EngineResult<()>;
}
