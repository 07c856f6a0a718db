//! HTTP handlers for the agent module
//!
//! Provides the push-stream endpoint for exchanges plus REST endpoints for
//! inspecting and deleting sessions. All handlers delegate to
//! [`AgentEngine`].

use crate::agent::engine::AgentEngine;
use crate::agent::types::StreamRequest;
use crate::codec::{AgentStreamEvent, SESSION_ID_HEADER};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// Shared state for agent handlers
#[derive(Clone)]
pub struct AgentState {
    pub engine: Arc<AgentEngine>,
}

/// Create the agent router with the streaming and REST endpoints
pub fn agent_router(state: AgentState) -> Router {
    Router::new()
        // Streaming endpoint
        .route("/api/agent/stream", post(stream_message))
        // REST endpoints
        .route("/api/agent/sessions", get(list_sessions))
        .route(
            "/api/agent/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .with_state(state)
}

// =============================================================================
// Streaming handler
// =============================================================================

/// Start an exchange and stream its events
async fn stream_message(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(request): Json<StreamRequest>,
) -> Response {
    let requested = request.session_id.clone().or_else(|| {
        headers
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let exchange = match state
        .engine
        .start_exchange(requested.as_deref(), request.message)
        .await
    {
        Ok(exchange) => exchange,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    // The exchange task is detached; it finishes even if this response is dropped
    let stream = ReceiverStream::new(exchange.events)
        .map(|event| Ok::<Event, Infallible>(to_sse_event(&event)));

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&exchange.session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

fn to_sse_event(event: &AgentStreamEvent) -> Event {
    Event::default()
        .event(event.kind())
        .data(event.data().to_string())
}

// =============================================================================
// REST handlers
// =============================================================================

/// List live sessions
async fn list_sessions(State(state): State<AgentState>) -> impl IntoResponse {
    Json(state.engine.registry().list().await)
}

/// Get one session with its history
async fn get_session(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.registry().get(&id).await {
        Some(session) => {
            let summary = session.summary().await;
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": summary.id,
                    "createdAt": summary.created_at,
                    "lastActive": summary.last_active,
                    "messages": session.history().await,
                })),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        ),
    }
}

/// Delete a session and its history
async fn delete_session(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.engine.registry().remove(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        )
            .into_response()
    }
}
