//! In-memory storage for tests and ephemeral sessions.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::types::{ClientRecord, DeltaRecord, SnapshotRecord};
use super::SyncStorage;
use crate::error::EngineResult;
use crate::state::{ClientId, Version, WorkspaceId};

#[derive(Debug, Default)]
struct MemoryInner {
    deltas: Vec<DeltaRecord>,
    snapshots: Vec<SnapshotRecord>,
    clients: HashMap<ClientId, ClientRecord>,
}

/// Keeps everything in process memory; same semantics as the SQLite
/// implementation, minus durability.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStorage for MemoryStorage {
    fn store_delta(
        &self,
        workspace_id: &str,
        version: Version,
        previous_version: Version,
        payload: &[u8],
    ) -> EngineResult<()> {
        let mut inner = self.inner.write();
        inner.deltas.push(DeltaRecord {
            workspace_id: workspace_id.to_string(),
            version,
            previous_version,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn deltas_since(
        &self,
        workspace_id: &str,
        since_version: Version,
    ) -> EngineResult<Vec<DeltaRecord>> {
        let inner = self.inner.read();
        let mut deltas: Vec<DeltaRecord> = inner
            .deltas
            .iter()
            .filter(|delta| delta.workspace_id == workspace_id && delta.version > since_version)
            .cloned()
            .collect();
        deltas.sort_by_key(|delta| delta.version);
        Ok(deltas)
    }

    fn store_snapshot(
        &self,
        workspace_id: &str,
        version: Version,
        payload: &[u8],
    ) -> EngineResult<()> {
        let mut inner = self.inner.write();
        inner
            .snapshots
            .retain(|snapshot| !(snapshot.workspace_id == workspace_id && snapshot.version == version));
        inner.snapshots.push(SnapshotRecord {
            workspace_id: workspace_id.to_string(),
            version,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn snapshot_at(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .snapshots
            .iter()
            .find(|snapshot| snapshot.workspace_id == workspace_id && snapshot.version == version)
            .cloned())
    }

    fn snapshot_at_or_before(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.workspace_id == workspace_id && snapshot.version <= version)
            .max_by_key(|snapshot| snapshot.version)
            .cloned())
    }

    fn latest_snapshot(&self, workspace_id: &str) -> EngineResult<Option<SnapshotRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .snapshots
            .iter()
            .filter(|snapshot| snapshot.workspace_id == workspace_id)
            .max_by_key(|snapshot| snapshot.version)
            .cloned())
    }

    fn latest_version(&self) -> EngineResult<Version> {
        let inner = self.inner.read();
        Ok(inner
            .deltas
            .iter()
            .map(|delta| delta.version)
            .max()
            .unwrap_or(0))
    }

    fn workspace_ids(&self) -> EngineResult<Vec<WorkspaceId>> {
        let inner = self.inner.read();
        let mut ids: Vec<WorkspaceId> = inner
            .deltas
            .iter()
            .map(|delta| delta.workspace_id.clone())
            .chain(
                inner
                    .snapshots
                    .iter()
                    .map(|snapshot| snapshot.workspace_id.clone()),
            )
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    fn register_client(&self, client_id: &str, workspace_id: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        inner.clients.insert(
            client_id.to_string(),
            ClientRecord {
                client_id: client_id.to_string(),
                workspace_id: workspace_id.to_string(),
                last_ack_version: 0,
            },
        );
        Ok(())
    }

    fn update_client_ack(&self, client_id: &str, version: Version) -> EngineResult<()> {
        let mut inner = self.inner.write();
        if let Some(record) = inner.clients.get_mut(client_id) {
            if version > record.last_ack_version {
                record.last_ack_version = version;
            }
        }
        Ok(())
    }

    fn remove_client(&self, client_id: &str) -> EngineResult<()> {
        let mut inner = self.inner.write();
        inner.clients.remove(client_id);
        Ok(())
    }

    fn workspace_clients(&self, workspace_id: &str) -> EngineResult<Vec<ClientRecord>> {
        let inner = self.inner.read();
        let mut clients: Vec<ClientRecord> = inner
            .clients
            .values()
            .filter(|record| record.workspace_id == workspace_id)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients)
    }

    fn vacuum(&self, keep_snapshots: usize, keep_delta_generations: u64) -> EngineResult<()> {
        let mut inner = self.inner.write();

        let mut workspaces: Vec<WorkspaceId> = inner
            .snapshots
            .iter()
            .map(|snapshot| snapshot.workspace_id.clone())
            .collect();
        workspaces.sort();
        workspaces.dedup();

        for workspace_id in workspaces {
            let mut versions: Vec<Version> = inner
                .snapshots
                .iter()
                .filter(|snapshot| snapshot.workspace_id == workspace_id)
                .map(|snapshot| snapshot.version)
                .collect();
            versions.sort_unstable_by(|a, b| b.cmp(a));
            let retained: Vec<Version> = versions.into_iter().take(keep_snapshots).collect();
            let Some(&oldest_retained) = retained.last() else {
                continue;
            };

            inner.snapshots.retain(|snapshot| {
                snapshot.workspace_id != workspace_id || retained.contains(&snapshot.version)
            });

            let cutoff = oldest_retained.saturating_sub(keep_delta_generations);
            inner
                .deltas
                .retain(|delta| delta.workspace_id != workspace_id || delta.version > cutoff);
        }
        Ok(())
    }
}
