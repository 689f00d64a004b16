//! # API Endpoint Handlers
//!
//! HTTP endpoint handlers plus the WebSocket control loop.

use super::{
    AppState,
    types::{
        AddPointRequest, AddPointResponse, ControlMessage, ErrorResponse, HealthResponse,
        InitReply, SnapshotResponse,
    },
};
use axum::{
    Json,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use tokio::sync::mpsc;
use wavegraph_core::{NodeUuid, SignalStore, WavegraphError};

/// Milliseconds per second; the control protocol carries epoch ms.
const MS_PER_SEC: f64 = 1000.0;

fn error_response(e: &WavegraphError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        WavegraphError::NodeNotFound(_) | WavegraphError::PointNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        WavegraphError::InvalidParameter(_)
        | WavegraphError::SelfConnection(_)
        | WavegraphError::NotSaved(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn malformed_uuid(raw: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("malformed node uuid: {raw}"),
        }),
    )
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// POINT HANDLER
// =============================================================================

/// Record a point, creating the node on first sight.
pub async fn add_point_handler<S: SignalStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<AddPointRequest>,
) -> impl IntoResponse {
    let node = NodeUuid(request.node_uuid.clone());
    if !node.is_well_formed() {
        return malformed_uuid(&request.node_uuid).into_response();
    }

    match state.engine.add_point(&node, request.timestamp_epoch) {
        Ok(point) => (
            StatusCode::CREATED,
            Json(AddPointResponse {
                node_uuid: node.0,
                point_uuid: point.uuid.0,
                timestamp_epoch: point.timestamp_epoch,
                timestamp_utc: point.timestamp_utc.to_rfc3339(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// =============================================================================
// SNAPSHOT HANDLER
// =============================================================================

/// Current signal envelope for a node; `signal` is null when none is
/// derivable yet.
pub async fn snapshot_handler<S: SignalStore>(
    State(state): State<AppState<S>>,
    Path(node_uuid): Path<String>,
) -> impl IntoResponse {
    let node = NodeUuid(node_uuid.clone());
    if !node.is_well_formed() {
        return malformed_uuid(&node_uuid).into_response();
    }

    match state.engine.snapshot(&node) {
        Ok(signal) => (
            StatusCode::OK,
            Json(SnapshotResponse {
                node_uuid: node.0,
                signal,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

// =============================================================================
// WEBSOCKET TRANSPORT
// =============================================================================

/// Upgrade to the live signal transport.
pub async fn signals_ws_handler<S: SignalStore>(
    State(state): State<AppState<S>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket<S: SignalStore>(state: AppState<S>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    // All outbound traffic (replies and room pushes) funnels through one
    // channel so the sink has a single writer.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut joined = BTreeSet::new();
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                handle_control(&state, text.as_str(), &out_tx, &mut joined);
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    tracing::debug!("signal connection closed");
}

/// Validate and dispatch one inbound control message.
///
/// Invalid messages are dropped with a diagnostic; the connection stays
/// open.
pub fn handle_control<S: SignalStore>(
    state: &AppState<S>,
    raw: &str,
    out_tx: &mpsc::UnboundedSender<String>,
    joined: &mut BTreeSet<NodeUuid>,
) {
    let message: ControlMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable control message");
            return;
        }
    };

    let Some(session_id) = message.data.session_id.as_deref() else {
        tracing::warn!(msg = %message.msg, "control message without session_id");
        return;
    };
    let Some(raw_uuid) = message.data.node_uuid.as_deref() else {
        tracing::warn!(msg = %message.msg, session = session_id, "control message without node_uuid");
        return;
    };
    let node = NodeUuid::from(raw_uuid);
    if !node.is_well_formed() {
        tracing::warn!(msg = %message.msg, session = session_id, uuid = raw_uuid, "malformed node uuid");
        return;
    }

    match message.msg.as_str() {
        "SignalConnectionInit" => {
            let signal = match state.engine.init_subscription(&node) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "subscription init failed");
                    return;
                }
            };

            if joined.insert(node.clone()) {
                join_room(state, &node, out_tx.clone());
            }

            // The reply goes to the requesting connection only; the node's
            // room channel carries signal updates exclusively.
            match serde_json::to_string(&InitReply::new(signal)) {
                Ok(reply) => {
                    let _ = out_tx.send(reply);
                }
                Err(e) => tracing::warn!(node = %node, error = %e, "unserializable init reply"),
            }
            tracing::info!(node = %node, session = session_id, "signal connection initialized");
        }
        "AddPoint" => {
            let timestamp = message.data.point_time.map(|ms| ms / MS_PER_SEC);
            if let Err(e) = state.engine.add_point(&node, timestamp) {
                tracing::warn!(node = %node, error = %e, "add point failed");
            }
        }
        other => {
            tracing::warn!(msg = other, session = session_id, "unknown control message");
        }
    }
}

/// Forward a node's room channel into the connection until it closes.
fn join_room<S: SignalStore>(
    state: &AppState<S>,
    node: &NodeUuid,
    out_tx: mpsc::UnboundedSender<String>,
) {
    let mut rx = state.room_sender(node).subscribe();
    let node = node.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(envelope) => match serde_json::to_string(&envelope) {
                        Ok(text) => {
                            if out_tx.send(text).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(node = %node, error = %e, "unserializable envelope");
                        }
                    },
                    // Lagged subscribers skip to the freshest signal
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                () = out_tx.closed() => break,
            }
        }
    });
}
