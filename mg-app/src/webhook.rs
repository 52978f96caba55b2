//! `/webhook`: subscription handshake and event delivery.

use crate::error::GatewayError;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use mg_messenger::{
    InboundEvent, SIGNATURE_HEADER, WebhookIngestor, WebhookPayload, verify_signature,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const WEBHOOK_PATH: &str = "/webhook";

struct WebhookState {
    inbound_tx: mpsc::Sender<InboundEvent>,
    verify_token: String,
    app_secret: Option<String>,
    ingestor: WebhookIngestor,
}

pub fn router(
    inbound_tx: mpsc::Sender<InboundEvent>,
    verify_token: String,
    app_secret: Option<String>,
) -> Router {
    let state = Arc::new(WebhookState {
        inbound_tx,
        verify_token: verify_token.trim().to_string(),
        app_secret: app_secret
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        ingestor: WebhookIngestor::new(),
    });
    Router::new()
        .route(WEBHOOK_PATH, get(verify_subscription).post(receive_events))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[tracing::instrument(level = "info", skip_all)]
async fn verify_subscription(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> impl IntoResponse {
    let mode = query.mode.as_deref().map(str::trim).unwrap_or_default();
    let token = query
        .verify_token
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if mode == "subscribe" && !state.verify_token.is_empty() && token == state.verify_token {
        tracing::info!("webhook subscription verified");
        return (StatusCode::OK, query.challenge.unwrap_or_default()).into_response();
    }
    let error = GatewayError::TransportVerification(format!("verify token mismatch (mode={mode:?})"));
    tracing::warn!(error = %error, error_kind = error.kind(), "webhook subscription rejected");
    (StatusCode::FORBIDDEN, "verification failed".to_string()).into_response()
}

#[tracing::instrument(level = "info", skip_all, fields(body_bytes = body.len()))]
async fn receive_events(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = state.app_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if !verify_signature(signature, &body, secret) {
            let error = GatewayError::TransportVerification(format!(
                "{SIGNATURE_HEADER} mismatch (present={})",
                signature.is_some()
            ));
            tracing::warn!(error = %error, error_kind = error.kind(), "webhook delivery rejected");
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "status": "error",
                    "error": format!("invalid {SIGNATURE_HEADER}"),
                })),
            )
                .into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(error = %error, "rejecting unparseable webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "status": "error",
                    "error": format!("invalid webhook payload: {error}"),
                })),
            )
                .into_response();
        }
    };

    let report = state.ingestor.ingest(payload);
    let mut accepted = 0usize;
    for event in report.events {
        if let Err(error) = state.inbound_tx.send(event).await {
            tracing::error!(error = %error, "inbound queue closed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "error",
                    "error": format!("inbound queue closed: {error}"),
                })),
            )
                .into_response();
        }
        accepted += 1;
    }

    tracing::debug!(
        accepted,
        skipped = report.skipped,
        standby = report.standby,
        "webhook batch enqueued"
    );
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "accepted": accepted,
            "skipped": report.skipped,
            "standby": report.standby,
        })),
    )
        .into_response()
}
