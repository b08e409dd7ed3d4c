//! YAPI MCP bridge library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, Method};
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod mcp;
pub mod state;
pub mod yapi;

use state::AppState;

/// Path of the push-stream endpoint.
pub const SSE_PATH: &str = "/sse";

/// Path of the message-submission endpoint.
pub const MESSAGES_PATH: &str = "/messages";

/// Create the Axum application router with a given state.
///
/// This function is used both by the main server binary and by integration tests.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route(SSE_PATH, get(api::sse::sse_handler))
        .route(MESSAGES_PATH, post(api::messages::post_message))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}
