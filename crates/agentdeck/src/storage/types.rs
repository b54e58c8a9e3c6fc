//! Persisted record structs and payload encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::mutation::Mutation;
use crate::state::{ClientId, Version, WorkspaceId, WorkspaceState};

/// A persisted delta: one applied mutation keyed by workspace and version.
/// Append-only; never updated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub workspace_id: WorkspaceId,
    pub version: Version,
    pub previous_version: Version,
    pub payload: Vec<u8>,
}

/// A persisted full copy of one workspace's state at a given version.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub workspace_id: WorkspaceId,
    pub version: Version,
    pub payload: Vec<u8>,
}

/// Catch-up bookkeeping for one connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub client_id: ClientId,
    pub workspace_id: WorkspaceId,
    pub last_ack_version: Version,
}

/// What a delta payload encodes: the mutation plus the instant it was
/// applied. Replay re-uses the recorded instant so reconstruction is
/// byte-identical to the live tree, timestamps included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaPayload {
    pub applied_at: DateTime<Utc>,
    pub mutation: Mutation,
}

impl DeltaPayload {
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> EngineResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A delta decoded back into its mutation, as handed to catch-up callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedDelta {
    pub version: Version,
    pub previous_version: Version,
    pub applied_at: DateTime<Utc>,
    pub mutation: Mutation,
}

pub fn encode_snapshot(state: &WorkspaceState) -> EngineResult<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

pub fn decode_snapshot(bytes: &[u8]) -> EngineResult<WorkspaceState> {
    Ok(serde_json::from_slice(bytes)?)
}
