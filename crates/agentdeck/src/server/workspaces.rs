use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;
use crate::state::WorkspaceState;
use crate::storage::DecodedDelta;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SnapshotQuery {
    /// Target version; omitted means the live state.
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeltasQuery {
    /// Return deltas with version strictly greater than this.
    #[serde(default)]
    pub since: u64,
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspace_id}/state",
    tag = "workspaces",
    params(("workspace_id" = String, Path, description = "Workspace identifier")),
    responses(
        (status = 200, description = "Live workspace state"),
        (status = 404, body = ApiErrorResponse),
    ),
    description = "Read the live state of one workspace."
)]
pub(crate) async fn workspace_state(
    State(state): State<Arc<ServerState>>,
    Path(workspace_id): Path<String>,
) -> Result<Json<WorkspaceState>, ApiError> {
    state
        .engine
        .workspace_state(&workspace_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown workspace {workspace_id}")))
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspace_id}/snapshot",
    tag = "workspaces",
    params(
        ("workspace_id" = String, Path, description = "Workspace identifier"),
        SnapshotQuery,
    ),
    responses(
        (status = 200, description = "Workspace state at the requested version"),
        (status = 404, body = ApiErrorResponse),
    ),
    description = "Read workspace state at a historical version, \
                   reconstructed from persisted snapshots and deltas."
)]
pub(crate) async fn workspace_snapshot(
    State(state): State<Arc<ServerState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<WorkspaceState>, ApiError> {
    state
        .engine
        .snapshot_at(&workspace_id, query.version)
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "no state for workspace {workspace_id} at the requested version"
            ))
        })
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspace_id}/deltas",
    tag = "workspaces",
    params(
        ("workspace_id" = String, Path, description = "Workspace identifier"),
        DeltasQuery,
    ),
    responses(
        (status = 200, description = "Missed mutations in ascending version order"),
    ),
    description = "Catch-up read: every persisted mutation after `since`."
)]
pub(crate) async fn workspace_deltas(
    State(state): State<Arc<ServerState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<DeltasQuery>,
) -> Result<Json<Vec<DecodedDelta>>, ApiError> {
    let deltas = state
        .engine
        .deltas_since(&workspace_id, query.since)
        .map_err(ApiError::from)?;
    Ok(Json(deltas))
}
