use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::mutation::Mutation;
use crate::server::error::{ApiError, ApiErrorResponse};
use crate::server::ServerState;

#[derive(Debug, Serialize, ToSchema)]
pub struct MutateResponse {
    pub version: u64,
}

#[utoipa::path(
    post,
    path = "/mutations",
    tag = "mutations",
    responses(
        (status = 200, body = MutateResponse),
        (status = 409, body = ApiErrorResponse),
        (status = 500, body = ApiErrorResponse),
    ),
    description = "Apply one mutation and return the global version it was \
                   assigned. The matching notification is delivered on the \
                   event stream."
)]
pub(crate) async fn submit_mutation(
    State(state): State<Arc<ServerState>>,
    Json(mutation): Json<Mutation>,
) -> Result<Json<MutateResponse>, ApiError> {
    let version = state.engine.mutate(mutation).map_err(ApiError::from)?;
    Ok(Json(MutateResponse { version }))
}
