use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::server::ServerState;

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses(
        (status = 200, description = "Server-sent stream of state-change notifications"),
    ),
    description = "Stream every state change as it is applied. Clients that \
                   lag behind the broadcast buffer are skipped and recover \
                   through the catch-up endpoints."
)]
pub(crate) async fn stream_events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.engine.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|message| match message {
        Ok(change) => {
            let payload = json!({
                "workspace_id": change.workspace_id,
                "version": change.version,
                "kind": change.mutation.kind(),
                "mutation": change.mutation,
            });
            Some(Ok(Event::default().data(payload.to_string())))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
