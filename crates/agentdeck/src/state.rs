//! The authoritative state tree the engine synchronizes.
//!
//! Owned exclusively by the mutation store; callers never mutate it
//! directly, only through [`crate::mutation::Mutation`]s. Chat messages,
//! tool payloads, pane layouts, and job/plan summaries come from external
//! collaborators and stay opaque `serde_json::Value`s end to end.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use dirwatch::{DirectoryEntry, WatcherStats};

/// Unique identifier for an open workspace.
pub type WorkspaceId = String;

/// Unique identifier for a conversational slot within a workspace.
pub type SlotId = String;

/// Unique identifier for a connected browser client.
pub type ClientId = String;

/// A value of the single global version counter.
pub type Version = u64;

/// An in-flight tool execution attached to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolExecution {
    pub execution_id: String,
    pub tool_name: String,
    pub input: Value,
    #[schema(value_type = String)]
    pub started_at: DateTime<Utc>,
}

/// The most recent watch failure recorded for a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchFailure {
    pub path: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One conversational execution context within a workspace.
///
/// Created on slot-create, mutated in place by subsequent mutations,
/// destroyed on slot-delete. `messages` is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub id: SlotId,
    pub session_id: Option<String>,
    pub messages: Vec<Value>,
    pub streaming: bool,
    pub compacting: bool,
    /// At most one outstanding interactive request.
    pub pending_ui: Option<Value>,
    pub tool_executions: Vec<ToolExecution>,
    pub steering_messages: Vec<Value>,
    pub follow_up_messages: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlotState {
    pub fn new(id: SlotId, session_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            session_id,
            messages: Vec::new(),
            streaming: false,
            compacting: false,
            pending_ui: None,
            tool_executions: Vec::new(),
            steering_messages: Vec::new(),
            follow_up_messages: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// One open project/directory context tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub id: WorkspaceId,
    pub path: String,
    pub active: bool,
    pub slots: HashMap<SlotId, SlotState>,
    pub panes: Value,
    pub sessions: Vec<Value>,
    pub plans: Vec<Value>,
    pub jobs: Vec<Value>,
    pub active_plan: Option<Value>,
    pub active_jobs: Vec<Value>,
    pub ui: Value,
    /// File-tree cache: directory path to its scanned entries.
    pub directory_entries: HashMap<String, Vec<DirectoryEntry>>,
    pub watched_directories: BTreeSet<String>,
    pub watcher_stats: Option<WatcherStats>,
    pub last_watch_failure: Option<WatchFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceState {
    /// Generate a new unique workspace ID.
    pub fn new_workspace_id() -> WorkspaceId {
        uuid::Uuid::now_v7().to_string()
    }

    pub fn new(id: WorkspaceId, path: String, at: DateTime<Utc>) -> Self {
        Self {
            id,
            path,
            active: true,
            slots: HashMap::new(),
            panes: Value::Null,
            sessions: Vec::new(),
            plans: Vec::new(),
            jobs: Vec::new(),
            active_plan: None,
            active_jobs: Vec::new(),
            ui: Value::Null,
            directory_entries: HashMap::new(),
            watched_directories: BTreeSet::new(),
            watcher_stats: None,
            last_watch_failure: None,
            created_at: at,
            updated_at: at,
        }
    }
}

/// The whole live tree: every open workspace under one version counter.
///
/// `version` is shared across all workspaces; every accepted mutation
/// increases it by exactly one, whichever workspace it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: Version,
    pub last_modified: DateTime<Utc>,
    pub workspaces: HashMap<WorkspaceId, WorkspaceState>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self {
            version: 0,
            last_modified: DateTime::<Utc>::UNIX_EPOCH,
            workspaces: HashMap::new(),
        }
    }

    pub fn workspace(&self, id: &str) -> Option<&WorkspaceState> {
        self.workspaces.get(id)
    }

    pub fn workspace_mut(&mut self, id: &str) -> Option<&mut WorkspaceState> {
        self.workspaces.get_mut(id)
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_global_state_is_empty() {
        let state = GlobalState::new();
        assert_eq!(state.version, 0);
        assert!(state.workspaces.is_empty());
    }

    #[test]
    fn workspace_creation_defaults() {
        let at = Utc::now();
        let ws = WorkspaceState::new("ws-1".to_string(), "/home/dev/project".to_string(), at);
        assert_eq!(ws.id, "ws-1");
        assert!(ws.active);
        assert!(ws.slots.is_empty());
        assert!(ws.watched_directories.is_empty());
        assert_eq!(ws.created_at, ws.updated_at);
    }

    #[test]
    fn workspace_serialize_roundtrip() {
        let at = Utc::now();
        let mut ws = WorkspaceState::new("ws-1".to_string(), "/project".to_string(), at);
        let mut slot = SlotState::new("default".to_string(), Some("sess-1".to_string()), at);
        slot.messages.push(json!({"role": "user", "text": "hello"}));
        ws.slots.insert("default".to_string(), slot);
        ws.watched_directories.insert("/project/src".to_string());

        let encoded = serde_json::to_string(&ws).expect("serialize");
        let decoded: WorkspaceState = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(ws, decoded);
    }

    #[test]
    fn generated_workspace_ids_are_unique() {
        assert_ne!(
            WorkspaceState::new_workspace_id(),
            WorkspaceState::new_workspace_id()
        );
    }

    #[test]
    fn slot_starts_quiet() {
        let slot = SlotState::new("default".to_string(), None, Utc::now());
        assert!(!slot.streaming);
        assert!(!slot.compacting);
        assert!(slot.pending_ui.is_none());
        assert!(slot.messages.is_empty());
        assert!(slot.tool_executions.is_empty());
    }
}
