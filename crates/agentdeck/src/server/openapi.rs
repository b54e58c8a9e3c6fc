use utoipa::OpenApi;

use crate::server::clients::{
    AckRequest, ApiStaleClient, ClientPosition, RegisterRequest, StaleClientsResponse,
};
use crate::server::error::{ApiErrorBody, ApiErrorResponse};
use crate::server::mutations::MutateResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Agentdeck Sync API",
        version = "0.1.0",
        description = "Workspace state synchronization for the agentdeck console"
    ),
    paths(
        crate::server::events::stream_events,
        crate::server::mutations::submit_mutation,
        crate::server::workspaces::workspace_state,
        crate::server::workspaces::workspace_snapshot,
        crate::server::workspaces::workspace_deltas,
        crate::server::clients::register,
        crate::server::clients::ack,
        crate::server::clients::disconnect,
        crate::server::clients::stale_clients,
    ),
    components(schemas(
        // Error
        ApiErrorResponse,
        ApiErrorBody,
        // Clients
        RegisterRequest,
        AckRequest,
        ClientPosition,
        StaleClientsResponse,
        ApiStaleClient,
        // Mutations
        MutateResponse,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/mutations"));
        assert!(doc.paths.paths.contains_key("/events"));
    }
}
