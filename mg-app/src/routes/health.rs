use crate::server::AppState;
use axum::routing::get;
use axum::{Extension, Json};
use chrono::Utc;
use std::sync::Arc;

pub const GREETING: &str = "Hello world, I am a chat bot";

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
}

async fn get_root() -> &'static str {
    GREETING
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "ready": true,
        "checked_at": Utc::now(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "sessions": state.sessions.len(),
        "idle": state.sessions.is_empty(),
        "actions": state.actions,
    }))
}
