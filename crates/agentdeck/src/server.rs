use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::SyncEngine;

pub mod clients;
pub mod error;
pub mod events;
pub mod mutations;
pub mod openapi;
pub mod workspaces;

pub struct Server {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    engine: Arc<SyncEngine>,
}

impl Server {
    pub async fn start(engine: Arc<SyncEngine>, addr: SocketAddr) -> Result<Self, String> {
        let state = Arc::new(ServerState {
            engine: engine.clone(),
        });
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        let app = Router::new()
            .route("/health", get(health))
            .route("/events", get(events::stream_events))
            .route("/mutations", post(mutations::submit_mutation))
            .route(
                "/workspaces/:workspace_id/state",
                get(workspaces::workspace_state),
            )
            .route(
                "/workspaces/:workspace_id/snapshot",
                get(workspaces::workspace_snapshot),
            )
            .route(
                "/workspaces/:workspace_id/deltas",
                get(workspaces::workspace_deltas),
            )
            .route(
                "/workspaces/:workspace_id/stale-clients",
                get(clients::stale_clients),
            )
            .route("/clients/:client_id/register", post(clients::register))
            .route("/clients/:client_id/ack", post(clients::ack))
            .route("/clients/:client_id", delete(clients::disconnect))
            .with_state(state)
            .layer(cors);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|error| error.to_string())?;
        let addr = listener
            .local_addr()
            .map_err(|error| error.to_string())?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Server {
            addr,
            shutdown: Some(shutdown_tx),
            engine,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) -> Result<(), String> {
        if let Some(sender) = self.shutdown.take() {
            sender
                .send(())
                .map_err(|_| "failed to send server shutdown signal".to_string())
        } else {
            Ok(())
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

async fn health() -> &'static str {
    "ok"
}

pub(crate) struct ServerState {
    pub(crate) engine: Arc<SyncEngine>,
}
