use crate::sentiment::SentimentSample;
use crate::server::AppState;
use crate::session::SessionSummary;
use axum::extract::Path;
use axum::routing::get;
use axum::{Extension, Json};
use mg_messenger::ParticipantId;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct SessionView {
    #[serde(flatten)]
    summary: SessionSummary,
    sample_count: usize,
    latest_sentiment: Option<SentimentSample>,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/sessions", get(list_sessions))
        .route(
            "/api/v1/sessions/{participant}/sentiment",
            get(participant_sentiment),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_sessions(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let sessions: Vec<SessionView> = state
        .sessions
        .list()
        .into_iter()
        .map(|summary| SessionView {
            sample_count: state.history.sample_count(&summary.participant_id),
            latest_sentiment: state.history.latest(&summary.participant_id),
            summary,
        })
        .collect();
    Json(serde_json::json!({ "sessions": sessions }))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn participant_sentiment(
    Extension(state): Extension<Arc<AppState>>,
    Path(participant): Path<String>,
) -> Json<serde_json::Value> {
    let participant = ParticipantId::new(participant);
    Json(serde_json::json!({
        "participant_id": participant,
        "session_id": state.sessions.session_id(&participant),
        "profile": state.sessions.profile(&participant),
        "samples": state.history.samples(&participant),
    }))
}
