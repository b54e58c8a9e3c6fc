//! The versioned mutation store.
//!
//! One authoritative in-memory tree for every open workspace, advanced
//! exclusively through [`Mutation`]s under a single global version
//! counter. Each accepted mutation is durably persisted as a delta before
//! its change notification fires, so subscribers can never observe a state
//! that crash recovery could not reconstruct.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::apply::apply_mutation;
use crate::bus::{Bus, StateChanged};
use crate::catchup::StaleClient;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::mutation::Mutation;
use crate::state::{GlobalState, Version, WorkspaceState};
use crate::storage::{
    decode_snapshot, encode_snapshot, DecodedDelta, DeltaPayload, SyncStorage,
};

pub struct SyncEngine {
    state: Mutex<GlobalState>,
    storage: Arc<dyn SyncStorage>,
    bus: Bus,
    config: EngineConfig,
    disposed: AtomicBool,
    vacuum_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine over empty state.
    pub fn new(storage: Arc<dyn SyncStorage>, config: EngineConfig) -> Self {
        Self::with_state(storage, config, GlobalState::new())
    }

    /// Rebuild the live tree from persisted snapshots and deltas, then
    /// resume versioning where the delta log left off.
    pub fn recover(storage: Arc<dyn SyncStorage>, config: EngineConfig) -> EngineResult<Self> {
        let mut state = GlobalState::new();
        for workspace_id in storage.workspace_ids()? {
            if let Some(ws) =
                reconstruct_workspace(storage.as_ref(), &workspace_id, Version::MAX)?
            {
                state.last_modified = state.last_modified.max(ws.updated_at);
                state.workspaces.insert(workspace_id, ws);
            }
        }
        state.version = storage.latest_version()?;
        debug!(
            version = state.version,
            workspaces = state.workspaces.len(),
            "recovered sync state"
        );
        Ok(Self::with_state(storage, config, state))
    }

    fn with_state(
        storage: Arc<dyn SyncStorage>,
        config: EngineConfig,
        state: GlobalState,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            storage,
            bus: Bus::new(256),
            config,
            disposed: AtomicBool::new(false),
            vacuum_task: Mutex::new(None),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one mutation: advance the global version, persist the delta,
    /// then notify subscribers, strictly in that order.
    ///
    /// Unknown workspace or slot targets still consume a version (the
    /// no-op replays deterministically), keeping the sequence gapless
    /// under out-of-order teardown traffic. If the delta cannot be
    /// persisted the in-memory tree is rolled back and the error is
    /// surfaced; no notification fires.
    pub fn mutate(&self, mutation: Mutation) -> EngineResult<Version> {
        let mut state = self.state.lock();
        if self.disposed.load(Ordering::SeqCst) {
            return Err(EngineError::Disposed);
        }

        let at = Utc::now();
        let previous_version = state.version;
        let version = previous_version + 1;
        let workspace_id = mutation.workspace_id().to_string();

        // Mutations touch exactly one workspace, so that entry plus the
        // global bookkeeping is a sufficient rollback point.
        let backup_workspace = state.workspaces.get(&workspace_id).cloned();
        let backup_modified = state.last_modified;

        apply_mutation(&mut state, &mutation, at);
        state.version = version;

        let persisted = DeltaPayload {
            applied_at: at,
            mutation: mutation.clone(),
        }
        .encode()
        .and_then(|bytes| {
            self.storage
                .store_delta(&workspace_id, version, previous_version, &bytes)
        });

        if let Err(error) = persisted {
            match backup_workspace {
                Some(ws) => {
                    state.workspaces.insert(workspace_id, ws);
                }
                None => {
                    state.workspaces.remove(&workspace_id);
                }
            }
            state.version = previous_version;
            state.last_modified = backup_modified;
            return Err(error);
        }

        if self.config.snapshot_interval > 0 && version % self.config.snapshot_interval == 0 {
            // Snapshots shorten replay distance; the delta above is already
            // durable, so a failed write costs nothing but replay time.
            if let Some(ws) = state.workspace(&workspace_id) {
                match encode_snapshot(ws) {
                    Ok(bytes) => {
                        if let Err(error) =
                            self.storage.store_snapshot(&workspace_id, version, &bytes)
                        {
                            warn!(%error, workspace_id, version, "snapshot write failed");
                        }
                    }
                    Err(error) => {
                        warn!(%error, workspace_id, version, "snapshot encode failed");
                    }
                }
            }
        }

        // Published under the state lock so notification order matches
        // version order.
        let _ = self.bus.publish(StateChanged {
            workspace_id,
            version,
            mutation,
        });
        Ok(version)
    }

    /// Live read of one workspace. No persistence access.
    pub fn workspace_state(&self, workspace_id: &str) -> Option<WorkspaceState> {
        self.state.lock().workspace(workspace_id).cloned()
    }

    /// The current global version.
    pub fn current_version(&self) -> Version {
        self.state.lock().version
    }

    /// Persisted mutations for a workspace with version strictly greater
    /// than `since_version`, ascending.
    pub fn deltas_since(
        &self,
        workspace_id: &str,
        since_version: Version,
    ) -> EngineResult<Vec<DecodedDelta>> {
        let mut decoded = Vec::new();
        for record in self.storage.deltas_since(workspace_id, since_version)? {
            let payload = DeltaPayload::decode(&record.payload)?;
            decoded.push(DecodedDelta {
                version: record.version,
                previous_version: record.previous_version,
                applied_at: payload.applied_at,
                mutation: payload.mutation,
            });
        }
        Ok(decoded)
    }

    /// Workspace state at a version.
    ///
    /// With `None`, a deep copy of the live state. With a version, the
    /// exact persisted snapshot if one exists, otherwise the latest
    /// snapshot at or before the target with the intervening deltas
    /// replayed onto a private working copy. Reconstruction is a pure
    /// read: it never touches the live tree, the version counter, or
    /// subscribers. Missing history yields `None`.
    pub fn snapshot_at(
        &self,
        workspace_id: &str,
        version: Option<Version>,
    ) -> EngineResult<Option<WorkspaceState>> {
        match version {
            None => Ok(self.workspace_state(workspace_id)),
            Some(target) => reconstruct_workspace(self.storage.as_ref(), workspace_id, target),
        }
    }

    /// Record a newly connected client at acknowledged version 0.
    pub fn register_client(&self, client_id: &str, workspace_id: &str) -> EngineResult<()> {
        self.storage.register_client(client_id, workspace_id)
    }

    /// Advance a client's acknowledged version; lower acks are ignored.
    pub fn client_ack(&self, client_id: &str, version: Version) -> EngineResult<()> {
        self.storage.update_client_ack(client_id, version)
    }

    /// Forget a disconnected client.
    pub fn remove_client(&self, client_id: &str) -> EngineResult<()> {
        self.storage.remove_client(client_id)
    }

    /// Clients of a workspace whose acknowledged version is behind
    /// `current_version`.
    pub fn stale_clients(
        &self,
        workspace_id: &str,
        current_version: Version,
    ) -> EngineResult<Vec<StaleClient>> {
        Ok(self
            .storage
            .workspace_clients(workspace_id)?
            .into_iter()
            .filter(|record| record.last_ack_version < current_version)
            .map(|record| StaleClient {
                client_id: record.client_id,
                last_ack_version: record.last_ack_version,
            })
            .collect())
    }

    /// Start the background retention vacuum. Failures are logged and
    /// retried on the next cycle; they never block mutation processing.
    pub fn start_vacuum(&self) {
        let storage = Arc::clone(&self.storage);
        let retention = self.config.vacuum.clone();
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(retention.interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) =
                    storage.vacuum(retention.keep_snapshots, retention.keep_delta_generations)
                {
                    warn!(%error, "retention vacuum failed; retrying next cycle");
                }
            }
        });
        *self.vacuum_task.lock() = Some(handle);
    }

    /// Stop background compaction and refuse further mutations.
    /// Subscribers observe the channel closing once the engine is dropped.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.vacuum_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Rebuild one workspace's state as of `target` from persisted history.
///
/// Operates entirely on a scratch tree so it can run concurrently with
/// live mutation.
fn reconstruct_workspace(
    storage: &dyn SyncStorage,
    workspace_id: &str,
    target: Version,
) -> EngineResult<Option<WorkspaceState>> {
    if let Some(snapshot) = storage.snapshot_at(workspace_id, target)? {
        return Ok(Some(decode_snapshot(&snapshot.payload)?));
    }

    let base = storage.snapshot_at_or_before(workspace_id, target)?;
    let (mut scratch, replay_from, mut seen) = match base {
        Some(snapshot) => {
            let ws = decode_snapshot(&snapshot.payload)?;
            let mut scratch = GlobalState::new();
            scratch.version = snapshot.version;
            scratch.workspaces.insert(workspace_id.to_string(), ws);
            (scratch, snapshot.version, true)
        }
        None => (GlobalState::new(), 0, false),
    };

    for delta in storage.deltas_since(workspace_id, replay_from)? {
        if delta.version > target {
            break;
        }
        let payload = DeltaPayload::decode(&delta.payload)?;
        apply_mutation(&mut scratch, &payload.mutation, payload.applied_at);
        scratch.version = delta.version;
        seen = true;
    }

    if !seen {
        return Ok(None);
    }
    Ok(scratch.workspaces.remove(workspace_id))
}
