//! HTTP surface: liveness probe and tool dispatch

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CleanupError, Result};
use crate::tools::{catalogue, error_reply, CleanupTools, ToolName};

pub fn router(tools: Arc<CleanupTools>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .with_state(tools)
}

/// Serve until the listener fails
pub async fn serve(addr: SocketAddr, tools: Arc<CleanupTools>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Tool server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(tools))
        .await
        .map_err(|e| CleanupError::NetworkError(format!("Server stopped: {}", e)))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn list_tools() -> impl IntoResponse {
    Json(json!({ "tools": catalogue() }))
}

async fn call_tool(
    State(tools): State<Arc<CleanupTools>>,
    Path(name): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let tool = match name.parse::<ToolName>() {
        Ok(tool) => tool,
        Err(e) => return (StatusCode::NOT_FOUND, Json(error_reply(e))),
    };

    let args = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                warn!("Rejected malformed body for {}: {}", tool, e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(error_reply(format!("Malformed JSON body: {}", e))),
                );
            }
        }
    };

    (StatusCode::OK, Json(tools.call(tool, args).await))
}
