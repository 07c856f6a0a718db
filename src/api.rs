//! Unified API router for the session bridge
//!
//! Merges the module routers into a single axum `Router` with CORS and
//! request tracing.
//!
//! ## Endpoint Map
//!
//! | Path                          | Module   | Description                   |
//! |-------------------------------|----------|-------------------------------|
//! | `/health`                     | api      | Health probe                  |
//! | `/ws/terminal`                | terminal | Terminal bridge WebSocket     |
//! | `/api/agent/stream`           | agent    | Agent push stream (SSE)       |
//! | `/api/agent/sessions[/:id]`   | agent    | Session list, detail, delete  |

use crate::agent::{agent_router, AgentState};
use crate::codec::SESSION_ID_HEADER;
use crate::terminal::{terminal_router, TerminalBridgeState};
use axum::{
    http::{header, HeaderName, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete application router
pub fn build_app(
    terminal_state: TerminalBridgeState,
    agent_state: AgentState,
    cors_origins: &[String],
) -> Router {
    let cors = build_cors(cors_origins);

    Router::new()
        // Root-level probe
        .route("/health", get(health_check))
        // Module routers (each defines its own prefixed routes)
        .merge(terminal_router(terminal_state))
        .merge(agent_router(agent_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_ID_HEADER);
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            session_header.clone(),
        ])
        .expose_headers([session_header]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(parsed)
    }
}
