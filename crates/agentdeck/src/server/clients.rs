use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::catchup::plan_catch_up;
use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub workspace_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AckRequest {
    pub version: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientPosition {
    pub client_id: String,
    pub workspace_id: String,
    pub last_ack_version: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StaleClientsQuery {
    /// Version to compare against; omitted means the current version.
    pub current: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StaleClientsResponse {
    pub current_version: u64,
    pub clients: Vec<ApiStaleClient>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiStaleClient {
    pub client_id: String,
    pub last_ack_version: u64,
    /// Either `deltas` or `snapshot`.
    #[schema(value_type = String)]
    pub catch_up: crate::catchup::CatchUpPlan,
}

#[utoipa::path(
    post,
    path = "/clients/{client_id}/register",
    tag = "clients",
    params(("client_id" = String, Path, description = "Client identifier")),
    request_body = RegisterRequest,
    responses(
        (status = 200, body = ClientPosition),
        (status = 500, body = ApiErrorResponse),
    ),
    description = "Register a connected client at acknowledged version 0. \
                   The caller follows up with a snapshot send and an ack."
)]
pub(crate) async fn register(
    State(state): State<Arc<ServerState>>,
    Path(client_id): Path<String>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ClientPosition>, ApiError> {
    state
        .engine
        .register_client(&client_id, &payload.workspace_id)
        .map_err(ApiError::from)?;
    Ok(Json(ClientPosition {
        client_id,
        workspace_id: payload.workspace_id,
        last_ack_version: 0,
    }))
}

#[utoipa::path(
    post,
    path = "/clients/{client_id}/ack",
    tag = "clients",
    params(("client_id" = String, Path, description = "Client identifier")),
    request_body = AckRequest,
    responses(
        (status = 200, description = "Acknowledgment recorded (stale acks are ignored)"),
        (status = 500, body = ApiErrorResponse),
    ),
    description = "Advance a client's acknowledged version."
)]
pub(crate) async fn ack(
    State(state): State<Arc<ServerState>>,
    Path(client_id): Path<String>,
    Json(payload): Json<AckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engine
        .client_ack(&client_id, payload.version)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[utoipa::path(
    delete,
    path = "/clients/{client_id}",
    tag = "clients",
    params(("client_id" = String, Path, description = "Client identifier")),
    responses(
        (status = 200, description = "Client forgotten"),
        (status = 500, body = ApiErrorResponse),
    ),
    description = "Drop catch-up tracking for a disconnected client."
)]
pub(crate) async fn disconnect(
    State(state): State<Arc<ServerState>>,
    Path(client_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .engine
        .remove_client(&client_id)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspace_id}/stale-clients",
    tag = "clients",
    params(
        ("workspace_id" = String, Path, description = "Workspace identifier"),
        StaleClientsQuery,
    ),
    responses(
        (status = 200, body = StaleClientsResponse),
        (status = 500, body = ApiErrorResponse),
    ),
    description = "Clients behind the given version, each with the \
                   catch-up route the transport should take."
)]
pub(crate) async fn stale_clients(
    State(state): State<Arc<ServerState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<StaleClientsQuery>,
) -> Result<Json<StaleClientsResponse>, ApiError> {
    let current_version = query
        .current
        .unwrap_or_else(|| state.engine.current_version());
    let threshold = state.engine.config().catch_up_snapshot_threshold;
    let clients = state
        .engine
        .stale_clients(&workspace_id, current_version)
        .map_err(ApiError::from)?
        .into_iter()
        .map(|stale| ApiStaleClient {
            catch_up: plan_catch_up(stale.last_ack_version, current_version, threshold),
            client_id: stale.client_id,
            last_ack_version: stale.last_ack_version,
        })
        .collect();
    Ok(Json(StaleClientsResponse {
        current_version,
        clients,
    }))
}
