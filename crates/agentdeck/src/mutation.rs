//! The closed set of state-change operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use dirwatch::{DirectoryEntry, WatcherStats};

use crate::state::{SlotId, ToolExecution, WorkspaceId};

/// An atomic, typed state-change request.
///
/// Mutations are the only admissible way to change workspace state; the
/// engine exposes no direct setters. Each variant carries its target
/// workspace (and slot where relevant) plus a payload. The enum is closed:
/// adding a kind forces the apply routine, the persistence encoder, and
/// every other `match` to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum Mutation {
    WorkspaceCreate {
        workspace_id: WorkspaceId,
        path: String,
    },
    WorkspaceClose {
        workspace_id: WorkspaceId,
    },
    SlotCreate {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        session_id: Option<String>,
    },
    SlotUpdate {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        update: SlotUpdate,
    },
    SlotDelete {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
    },
    MessagesAppend {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        messages: Vec<Value>,
    },
    PendingUiSet {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        request: Option<Value>,
    },
    ToolExecutionStart {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        execution: ToolExecution,
    },
    ToolExecutionEnd {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        execution_id: String,
    },
    PaneUpdate {
        workspace_id: WorkspaceId,
        panes: Value,
    },
    SessionsUpdate {
        workspace_id: WorkspaceId,
        sessions: Vec<Value>,
    },
    PlansUpdate {
        workspace_id: WorkspaceId,
        plans: Vec<Value>,
    },
    JobsUpdate {
        workspace_id: WorkspaceId,
        jobs: Vec<Value>,
    },
    ActivePlanUpdate {
        workspace_id: WorkspaceId,
        plan: Option<Value>,
    },
    ActiveJobsUpdate {
        workspace_id: WorkspaceId,
        jobs: Vec<Value>,
    },
    WorkspaceUiUpdate {
        workspace_id: WorkspaceId,
        ui: Value,
    },
    QueuedMessagesUpdate {
        workspace_id: WorkspaceId,
        slot_id: SlotId,
        steering: Vec<Value>,
        follow_up: Vec<Value>,
    },
    DirectoryEntriesUpdate {
        workspace_id: WorkspaceId,
        path: String,
        #[schema(value_type = Vec<Object>)]
        entries: Vec<DirectoryEntry>,
    },
    WatchedDirectoryAdd {
        workspace_id: WorkspaceId,
        path: String,
    },
    WatchedDirectoryRemove {
        workspace_id: WorkspaceId,
        path: String,
    },
    WatcherStatsUpdate {
        workspace_id: WorkspaceId,
        #[schema(value_type = Object)]
        stats: WatcherStats,
    },
    DirectoryWatchError {
        workspace_id: WorkspaceId,
        path: String,
        message: String,
    },
}

/// Partial update applied to an existing slot; absent fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlotUpdate {
    pub session_id: Option<String>,
    pub streaming: Option<bool>,
    pub compacting: Option<bool>,
}

impl Mutation {
    /// The workspace this mutation targets.
    pub fn workspace_id(&self) -> &str {
        match self {
            Mutation::WorkspaceCreate { workspace_id, .. }
            | Mutation::WorkspaceClose { workspace_id }
            | Mutation::SlotCreate { workspace_id, .. }
            | Mutation::SlotUpdate { workspace_id, .. }
            | Mutation::SlotDelete { workspace_id, .. }
            | Mutation::MessagesAppend { workspace_id, .. }
            | Mutation::PendingUiSet { workspace_id, .. }
            | Mutation::ToolExecutionStart { workspace_id, .. }
            | Mutation::ToolExecutionEnd { workspace_id, .. }
            | Mutation::PaneUpdate { workspace_id, .. }
            | Mutation::SessionsUpdate { workspace_id, .. }
            | Mutation::PlansUpdate { workspace_id, .. }
            | Mutation::JobsUpdate { workspace_id, .. }
            | Mutation::ActivePlanUpdate { workspace_id, .. }
            | Mutation::ActiveJobsUpdate { workspace_id, .. }
            | Mutation::WorkspaceUiUpdate { workspace_id, .. }
            | Mutation::QueuedMessagesUpdate { workspace_id, .. }
            | Mutation::DirectoryEntriesUpdate { workspace_id, .. }
            | Mutation::WatchedDirectoryAdd { workspace_id, .. }
            | Mutation::WatchedDirectoryRemove { workspace_id, .. }
            | Mutation::WatcherStatsUpdate { workspace_id, .. }
            | Mutation::DirectoryWatchError { workspace_id, .. } => workspace_id,
        }
    }

    /// Stable kind label for logging and notification payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::WorkspaceCreate { .. } => "workspace_create",
            Mutation::WorkspaceClose { .. } => "workspace_close",
            Mutation::SlotCreate { .. } => "slot_create",
            Mutation::SlotUpdate { .. } => "slot_update",
            Mutation::SlotDelete { .. } => "slot_delete",
            Mutation::MessagesAppend { .. } => "messages_append",
            Mutation::PendingUiSet { .. } => "pending_ui_set",
            Mutation::ToolExecutionStart { .. } => "tool_execution_start",
            Mutation::ToolExecutionEnd { .. } => "tool_execution_end",
            Mutation::PaneUpdate { .. } => "pane_update",
            Mutation::SessionsUpdate { .. } => "sessions_update",
            Mutation::PlansUpdate { .. } => "plans_update",
            Mutation::JobsUpdate { .. } => "jobs_update",
            Mutation::ActivePlanUpdate { .. } => "active_plan_update",
            Mutation::ActiveJobsUpdate { .. } => "active_jobs_update",
            Mutation::WorkspaceUiUpdate { .. } => "workspace_ui_update",
            Mutation::QueuedMessagesUpdate { .. } => "queued_messages_update",
            Mutation::DirectoryEntriesUpdate { .. } => "directory_entries_update",
            Mutation::WatchedDirectoryAdd { .. } => "watched_directory_add",
            Mutation::WatchedDirectoryRemove { .. } => "watched_directory_remove",
            Mutation::WatcherStatsUpdate { .. } => "watcher_stats_update",
            Mutation::DirectoryWatchError { .. } => "directory_watch_error",
        }
    }
}
