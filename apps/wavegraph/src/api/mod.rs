//! # Wavegraph HTTP API Module
//!
//! This module implements the HTTP/WebSocket server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /point` - Record a point (creates the node on first sight)
//! - `GET /snapshot/{node}` - Current signal envelope for a node
//! - `GET /signals/ws` - Live signal transport (WebSocket)
//!
//! ## Configuration (Environment Variables)
//!
//! - `WAVEGRAPH_CORS_ORIGINS`: Comma-separated list of allowed origins, or
//!   "*" for all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `wavegraph::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    add_point_handler, handle_control, health_handler, signals_ws_handler, snapshot_handler,
};
#[allow(unused_imports)]
pub use types::{
    AddPointRequest, AddPointResponse, ControlData, ControlMessage, ErrorResponse,
    HealthResponse, InitReply, SnapshotResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use wavegraph_core::{
    Broadcast, NodeUuid, SignalEngine, SignalEnvelope, SignalStore, WavegraphError,
};

/// Capacity of one node's room channel; slow readers skip ahead.
const ROOM_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// SERVER STATE
// =============================================================================

type Rooms = Arc<Mutex<BTreeMap<NodeUuid, broadcast::Sender<SignalEnvelope>>>>;

/// Shared server state: the engine plus one broadcast channel per
/// subscribed node. The fan-out callback publishes into the room; every
/// WebSocket connection that joined the node forwards from it.
pub struct AppState<S: SignalStore> {
    pub engine: Arc<SignalEngine<S>>,
    rooms: Rooms,
}

impl<S: SignalStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            rooms: Arc::clone(&self.rooms),
        }
    }
}

impl<S: SignalStore> AppState<S> {
    /// Build the state: the engine's fan-out broadcasts into the rooms.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let rooms: Rooms = Arc::new(Mutex::new(BTreeMap::new()));

        let fanout_rooms = Arc::clone(&rooms);
        let broadcast: Broadcast = Arc::new(move |node, envelope| {
            let guard = fanout_rooms.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tx) = guard.get(&node) {
                // Send fails only when no connection currently listens
                let _ = tx.send(envelope);
            }
        });

        Self {
            engine: Arc::new(SignalEngine::new(store, broadcast)),
            rooms,
        }
    }

    /// The room channel for a node, created on first use.
    #[must_use]
    pub fn room_sender(&self, node: &NodeUuid) -> broadcast::Sender<SignalEnvelope> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(node.clone())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .clone()
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `WAVEGRAPH_CORS_ORIGINS`:
/// - If "*": allows all origins
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("WAVEGRAPH_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (WAVEGRAPH_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in WAVEGRAPH_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No WAVEGRAPH_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router<S: SignalStore>(state: AppState<S>) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/point", post(handlers::add_point_handler::<S>))
        .route("/snapshot/{node}", get(handlers::snapshot_handler::<S>))
        .route("/signals/ws", get(handlers::signals_ws_handler::<S>))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server; returns after shutdown (ctrl-c), with every
/// tailer stopped.
pub async fn run_server<S: SignalStore>(
    addr: &str,
    state: AppState<S>,
) -> Result<(), WavegraphError> {
    let engine = Arc::clone(&state.engine);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| WavegraphError::Io(format!("Bind failed: {e}")))?;

    tracing::info!("Wavegraph server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WavegraphError::Io(format!("Server error: {e}")))?;

    engine.shutdown().await;
    tracing::info!("Wavegraph server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Shutdown signal listener failed: {}", e);
    }
}
