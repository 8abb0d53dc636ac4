//! HTTP / WebSocket front end
//!
//! `/` serves the bundled page when one is configured, `/health` answers
//! "OK", and `/ws` carries the event protocol. Every WebSocket connection is
//! one caller with its own session slot.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::{ClientEvent, EventSink};
use crate::session::{ClientId, SessionManager};

/// Text served at `/` when there is no index page
pub const FALLBACK_INDEX: &str = "Backend is running! (index.html not found, but socket is ready)";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] crate::error::Error),
}

#[derive(Clone)]
pub struct AppState {
    manager: SessionManager,
    index_path: Arc<PathBuf>,
}

impl AppState {
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }
}

pub fn create_app(manager: SessionManager) -> Router {
    let state = AppState {
        index_path: Arc::new(manager.config().server.index_path.clone()),
        manager,
    };

    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), ServerError> {
    run_server_with_shutdown(app, addr, std::future::pending()).await
}

/// Serve until `shutdown` resolves
pub async fn run_server_with_shutdown<F>(
    app: Router,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting runterm server on {}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn index(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.index_path.as_ref()).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            debug!("Index {} unavailable: {}", state.index_path.display(), e);
            FALLBACK_INDEX.into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = ClientId::new();
    info!("Client {} connected", client);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut events) = EventSink::channel();

    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {:?}: {}", event, e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientEvent::from_json(&text) {
                Ok(event) => {
                    state.manager.dispatch(&client, event, &sink).await;
                }
                Err(e) => warn!("Ignoring malformed message from {}: {}", client, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error from {}: {}", client, e);
                break;
            }
        }
    }

    state.manager.disconnect(&client).await;
    forwarder.abort();
    info!("Client {} disconnected", client);
}
