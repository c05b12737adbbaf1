//! Thin HTTP surface over the orchestrator.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::orchestrator::{ConversationOrchestrator, TurnRequest, TurnResponse};

pub fn router(orchestrator: Arc<ConversationOrchestrator>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn chat(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    Json(request): Json<TurnRequest>,
) -> Json<TurnResponse> {
    Json(orchestrator.handle_message(request).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
