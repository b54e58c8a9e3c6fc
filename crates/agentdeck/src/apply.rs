//! Pure mutation application.
//!
//! One routine drives both live mutation and historical replay; it only
//! ever touches the tree it is handed and takes the application instant as
//! an argument, so replaying a persisted delta stream reproduces the live
//! tree exactly. Unknown workspace or slot targets are ignored: mutations
//! can arrive for contexts already torn down.

use chrono::{DateTime, Utc};

use crate::mutation::{Mutation, SlotUpdate};
use crate::state::{GlobalState, SlotState, WatchFailure, WorkspaceState};

/// Apply `mutation` to `state` as of `at`.
///
/// Does not touch the version counter; sequencing belongs to the caller.
pub fn apply_mutation(state: &mut GlobalState, mutation: &Mutation, at: DateTime<Utc>) {
    match mutation {
        Mutation::WorkspaceCreate { workspace_id, path } => {
            state
                .workspaces
                .entry(workspace_id.clone())
                .or_insert_with(|| {
                    WorkspaceState::new(workspace_id.clone(), path.clone(), at)
                });
        }
        Mutation::WorkspaceClose { workspace_id } => {
            state.workspaces.remove(workspace_id);
        }
        Mutation::SlotCreate {
            workspace_id,
            slot_id,
            session_id,
        } => {
            if let Some(ws) = state.workspace_mut(workspace_id) {
                ws.slots
                    .entry(slot_id.clone())
                    .or_insert_with(|| SlotState::new(slot_id.clone(), session_id.clone(), at));
                ws.updated_at = at;
            }
        }
        Mutation::SlotUpdate {
            workspace_id,
            slot_id,
            update,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                apply_slot_update(slot, update, at);
            }
        }
        Mutation::SlotDelete {
            workspace_id,
            slot_id,
        } => {
            if let Some(ws) = state.workspace_mut(workspace_id) {
                if ws.slots.remove(slot_id).is_some() {
                    ws.updated_at = at;
                }
            }
        }
        Mutation::MessagesAppend {
            workspace_id,
            slot_id,
            messages,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                slot.messages.extend(messages.iter().cloned());
                slot.updated_at = at;
            }
        }
        Mutation::PendingUiSet {
            workspace_id,
            slot_id,
            request,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                slot.pending_ui = request.clone();
                slot.updated_at = at;
            }
        }
        Mutation::ToolExecutionStart {
            workspace_id,
            slot_id,
            execution,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                slot.tool_executions.push(execution.clone());
                slot.updated_at = at;
            }
        }
        Mutation::ToolExecutionEnd {
            workspace_id,
            slot_id,
            execution_id,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                slot.tool_executions
                    .retain(|execution| execution.execution_id != *execution_id);
                slot.updated_at = at;
            }
        }
        Mutation::PaneUpdate {
            workspace_id,
            panes,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.panes = panes.clone();
            }
        }
        Mutation::SessionsUpdate {
            workspace_id,
            sessions,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.sessions = sessions.clone();
            }
        }
        Mutation::PlansUpdate {
            workspace_id,
            plans,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.plans = plans.clone();
            }
        }
        Mutation::JobsUpdate { workspace_id, jobs } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.jobs = jobs.clone();
            }
        }
        Mutation::ActivePlanUpdate { workspace_id, plan } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.active_plan = plan.clone();
            }
        }
        Mutation::ActiveJobsUpdate { workspace_id, jobs } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.active_jobs = jobs.clone();
            }
        }
        Mutation::WorkspaceUiUpdate { workspace_id, ui } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.ui = ui.clone();
            }
        }
        Mutation::QueuedMessagesUpdate {
            workspace_id,
            slot_id,
            steering,
            follow_up,
        } => {
            if let Some(slot) = slot_mut(state, workspace_id, slot_id, at) {
                slot.steering_messages = steering.clone();
                slot.follow_up_messages = follow_up.clone();
                slot.updated_at = at;
            }
        }
        Mutation::DirectoryEntriesUpdate {
            workspace_id,
            path,
            entries,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.directory_entries.insert(path.clone(), entries.clone());
            }
        }
        Mutation::WatchedDirectoryAdd { workspace_id, path } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.watched_directories.insert(path.clone());
            }
        }
        Mutation::WatchedDirectoryRemove { workspace_id, path } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.watched_directories.remove(path);
                ws.directory_entries.remove(path);
            }
        }
        Mutation::WatcherStatsUpdate {
            workspace_id,
            stats,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.watcher_stats = Some(*stats);
            }
        }
        Mutation::DirectoryWatchError {
            workspace_id,
            path,
            message,
        } => {
            if let Some(ws) = workspace_mut(state, workspace_id, at) {
                ws.watched_directories.remove(path);
                ws.directory_entries.remove(path);
                ws.last_watch_failure = Some(WatchFailure {
                    path: path.clone(),
                    message: message.clone(),
                    at,
                });
            }
        }
    }
    state.last_modified = at;
}

fn workspace_mut<'a>(
    state: &'a mut GlobalState,
    workspace_id: &str,
    at: DateTime<Utc>,
) -> Option<&'a mut WorkspaceState> {
    let ws = state.workspace_mut(workspace_id)?;
    ws.updated_at = at;
    Some(ws)
}

fn slot_mut<'a>(
    state: &'a mut GlobalState,
    workspace_id: &str,
    slot_id: &str,
    at: DateTime<Utc>,
) -> Option<&'a mut SlotState> {
    let ws = state.workspace_mut(workspace_id)?;
    let slot = ws.slots.get_mut(slot_id)?;
    ws.updated_at = at;
    Some(slot)
}

fn apply_slot_update(slot: &mut SlotState, update: &SlotUpdate, at: DateTime<Utc>) {
    if let Some(session_id) = &update.session_id {
        slot.session_id = Some(session_id.clone());
    }
    if let Some(streaming) = update.streaming {
        slot.streaming = streaming;
    }
    if let Some(compacting) = update.compacting {
        slot.compacting = compacting;
    }
    slot.updated_at = at;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ToolExecution;
    use serde_json::json;

    fn seeded() -> (GlobalState, DateTime<Utc>) {
        let at = Utc::now();
        let mut state = GlobalState::new();
        apply_mutation(
            &mut state,
            &Mutation::WorkspaceCreate {
                workspace_id: "ws-1".to_string(),
                path: "/project".to_string(),
            },
            at,
        );
        apply_mutation(
            &mut state,
            &Mutation::SlotCreate {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                session_id: None,
            },
            at,
        );
        (state, at)
    }

    #[test]
    fn workspace_create_and_close() {
        let at = Utc::now();
        let mut state = GlobalState::new();
        apply_mutation(
            &mut state,
            &Mutation::WorkspaceCreate {
                workspace_id: "ws-1".to_string(),
                path: "/project".to_string(),
            },
            at,
        );
        assert!(state.workspace("ws-1").is_some());

        apply_mutation(
            &mut state,
            &Mutation::WorkspaceClose {
                workspace_id: "ws-1".to_string(),
            },
            at,
        );
        assert!(state.workspace("ws-1").is_none());
    }

    #[test]
    fn messages_append_is_cumulative() {
        let (mut state, at) = seeded();
        for text in ["one", "two"] {
            apply_mutation(
                &mut state,
                &Mutation::MessagesAppend {
                    workspace_id: "ws-1".to_string(),
                    slot_id: "default".to_string(),
                    messages: vec![json!({ "text": text })],
                },
                at,
            );
        }
        let slot = &state.workspace("ws-1").unwrap().slots["default"];
        assert_eq!(slot.messages.len(), 2);
        assert_eq!(slot.messages[1], json!({ "text": "two" }));
    }

    #[test]
    fn slot_update_touches_only_present_fields() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::SlotUpdate {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                update: SlotUpdate {
                    session_id: None,
                    streaming: Some(true),
                    compacting: None,
                },
            },
            at,
        );
        let slot = &state.workspace("ws-1").unwrap().slots["default"];
        assert!(slot.streaming);
        assert!(!slot.compacting);
        assert!(slot.session_id.is_none());
    }

    #[test]
    fn tool_execution_lifecycle() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::ToolExecutionStart {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                execution: ToolExecution {
                    execution_id: "exec-1".to_string(),
                    tool_name: "bash".to_string(),
                    input: json!({ "command": "ls" }),
                    started_at: at,
                },
            },
            at,
        );
        assert_eq!(
            state.workspace("ws-1").unwrap().slots["default"]
                .tool_executions
                .len(),
            1
        );

        apply_mutation(
            &mut state,
            &Mutation::ToolExecutionEnd {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                execution_id: "exec-1".to_string(),
            },
            at,
        );
        assert!(state.workspace("ws-1").unwrap().slots["default"]
            .tool_executions
            .is_empty());
    }

    #[test]
    fn pending_ui_holds_one_request() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::PendingUiSet {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                request: Some(json!({ "kind": "confirm" })),
            },
            at,
        );
        assert!(state.workspace("ws-1").unwrap().slots["default"]
            .pending_ui
            .is_some());

        apply_mutation(
            &mut state,
            &Mutation::PendingUiSet {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                request: None,
            },
            at,
        );
        assert!(state.workspace("ws-1").unwrap().slots["default"]
            .pending_ui
            .is_none());
    }

    #[test]
    fn unknown_targets_are_no_ops() {
        let (mut state, at) = seeded();
        let before = state.clone();

        apply_mutation(
            &mut state,
            &Mutation::MessagesAppend {
                workspace_id: "ws-1".to_string(),
                slot_id: "missing".to_string(),
                messages: vec![json!({ "text": "lost" })],
            },
            at,
        );
        apply_mutation(
            &mut state,
            &Mutation::PaneUpdate {
                workspace_id: "ws-missing".to_string(),
                panes: json!({ "split": "vertical" }),
            },
            at,
        );

        assert_eq!(before.workspaces, state.workspaces);
    }

    #[test]
    fn watched_directory_remove_drops_cache() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::WatchedDirectoryAdd {
                workspace_id: "ws-1".to_string(),
                path: "/project/src".to_string(),
            },
            at,
        );
        apply_mutation(
            &mut state,
            &Mutation::DirectoryEntriesUpdate {
                workspace_id: "ws-1".to_string(),
                path: "/project/src".to_string(),
                entries: Vec::new(),
            },
            at,
        );
        apply_mutation(
            &mut state,
            &Mutation::WatchedDirectoryRemove {
                workspace_id: "ws-1".to_string(),
                path: "/project/src".to_string(),
            },
            at,
        );

        let ws = state.workspace("ws-1").unwrap();
        assert!(ws.watched_directories.is_empty());
        assert!(ws.directory_entries.is_empty());
    }

    #[test]
    fn watch_error_records_failure_and_tears_down() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::WatchedDirectoryAdd {
                workspace_id: "ws-1".to_string(),
                path: "/project/secret".to_string(),
            },
            at,
        );
        apply_mutation(
            &mut state,
            &Mutation::DirectoryWatchError {
                workspace_id: "ws-1".to_string(),
                path: "/project/secret".to_string(),
                message: "permission denied".to_string(),
            },
            at,
        );

        let ws = state.workspace("ws-1").unwrap();
        assert!(ws.watched_directories.is_empty());
        let failure = ws.last_watch_failure.as_ref().unwrap();
        assert_eq!(failure.path, "/project/secret");
        assert_eq!(failure.message, "permission denied");
    }

    #[test]
    fn queued_messages_are_replaced_wholesale() {
        let (mut state, at) = seeded();
        apply_mutation(
            &mut state,
            &Mutation::QueuedMessagesUpdate {
                workspace_id: "ws-1".to_string(),
                slot_id: "default".to_string(),
                steering: vec![json!({ "text": "steer" })],
                follow_up: vec![json!({ "text": "later" }), json!({ "text": "after" })],
            },
            at,
        );
        let slot = &state.workspace("ws-1").unwrap().slots["default"];
        assert_eq!(slot.steering_messages.len(), 1);
        assert_eq!(slot.follow_up_messages.len(), 2);
    }
}
