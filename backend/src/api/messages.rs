//! Message-submission endpoint for MCP sessions.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::mcp::{CloseReason, JsonRpcRequest, JsonRpcResponse, McpHandler, PushError, SessionEvent};
use crate::state::AppState;

/// Body of the 400 response for an unknown session.
pub const NO_TRANSPORT: &str = "No transport found for sessionId";

/// Query parameters of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

fn no_transport() -> Response {
    (StatusCode::BAD_REQUEST, NO_TRANSPORT).into_response()
}

/// POST /messages?sessionId=<id> - Submit a JSON-RPC message to a session.
///
/// Successful results are written to the session's event stream and the
/// call itself answers `202 Accepted`. Failed commands are answered here,
/// with the error status and a JSON-RPC error body; the stream is untouched.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session_id) = query.session_id else {
        return no_transport();
    };
    if !state.sessions().contains(&session_id) {
        return no_transport();
    }

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("MCP: Invalid message for session {}: {}", session_id, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                )),
            )
                .into_response();
        }
    };

    let request_id = request.id.clone();
    debug!(
        "MCP POST: method={}, session={}",
        request.method, session_id
    );

    let response = match McpHandler::handle_request(&state, request).await {
        Ok(Some(response)) => response,
        Ok(None) => return (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => {
            return (
                e.status(),
                Json(JsonRpcResponse::error(request_id, e.code(), e.to_string())),
            )
                .into_response();
        }
    };

    let json = match serde_json::to_string(&response) {
        Ok(json) => json,
        Err(e) => {
            error!("MCP: Failed to serialize response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The session may have closed while the command was running.
    let Some(session) = state.sessions().get(&session_id) else {
        return no_transport();
    };
    // Never waits: a full channel means the client stopped reading.
    if let Err(e) = session.push(SessionEvent::Message(json)) {
        error!("MCP: {}", e);
        let reason = match e {
            PushError::Closed(_) => CloseReason::ChannelDead,
            PushError::Full(_) => CloseReason::ChannelFull,
        };
        session.teardown(reason);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to write to push stream",
        )
            .into_response();
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}
