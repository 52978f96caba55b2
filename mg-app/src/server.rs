//! moodgate server.
//!
//! Wires the Messenger transport, the NLU client and the escalation pipeline
//! behind one axum app.

use crate::actions::ActionRegistry;
use crate::config::GatewayConfig;
use crate::dispatcher::IntentDispatcher;
use crate::gateway::Gateway;
use crate::responder::ResponseRouter;
use crate::routes;
use crate::sentiment::SentimentHistory;
use crate::session::SessionRegistry;
use crate::webhook;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use mg_messenger::{
    GraphMessengerAdapter, GraphProfileClient, MessengerTransport, ParticipantId, ProfileFetcher,
};
use mg_nlu::{DialogflowClient, NluBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Read-only view shared with the operator routes.
pub struct AppState {
    pub started_at: Instant,
    pub sessions: Arc<SessionRegistry>,
    pub history: Arc<SentimentHistory>,
    pub actions: Vec<String>,
}

#[cfg(test)]
impl AppState {
    pub fn for_tests() -> Self {
        Self {
            started_at: Instant::now(),
            sessions: Arc::new(SessionRegistry::new()),
            history: Arc::new(SentimentHistory::new(None)),
            actions: Vec::new(),
        }
    }
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = GatewayConfig::load(config_path).await?;
    let nlu = build_nlu(&cfg)?;
    build_transport(&cfg)?;
    tracing::info!(
        bind_addr = %bind_addr(&cfg)?,
        nlu_project_id = %nlu.project_id(),
        nlu_language_code = %cfg.nlu.language_code,
        signature_required = cfg.app_secret().is_some(),
        handover_app_id = ?cfg.messenger.handover_app_id,
        compare_with_history = cfg.escalation.compare_with_history,
        max_samples_per_participant = ?cfg.sentiment.max_samples_per_participant,
        "config ok"
    );
    Ok(())
}

pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    recipient: &str,
    message: &str,
) -> Result<()> {
    let cfg = GatewayConfig::load(config_path).await?;
    let transport = build_transport(&cfg)?;
    transport
        .send_text(&ParticipantId::new(recipient.trim()), message)
        .await?;
    tracing::info!(recipient = %recipient, "one-shot message sent");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = GatewayConfig::load(config_path).await?;
    let started_at = Instant::now();
    let addr = bind_addr(&cfg)?;
    tracing::info!(
        bind_addr = %addr,
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        queue_capacity = cfg.gateway.queue_capacity,
        nlu_project_id = %cfg.nlu.project_id,
        nlu_language_code = %cfg.nlu.language_code,
        signature_required = cfg.app_secret().is_some(),
        soft_check_delta = cfg.escalation.soft_check_delta,
        soft_check_floor = cfg.escalation.soft_check_floor,
        escalate_below = cfg.escalation.escalate_below,
        compare_with_history = cfg.escalation.compare_with_history,
        max_samples_per_participant = ?cfg.sentiment.max_samples_per_participant,
        "server configuration loaded"
    );
    let listener = preflight_bind_listener(addr).await?;

    let transport: Arc<dyn MessengerTransport> = Arc::new(build_transport(&cfg)?);
    let profiles: Arc<dyn ProfileFetcher> = Arc::new(build_profiles(&cfg)?);
    let nlu: Arc<dyn NluBackend> = Arc::new(build_nlu(&cfg)?);

    let sessions = Arc::new(SessionRegistry::new());
    let history = Arc::new(SentimentHistory::new(
        cfg.sentiment.max_samples_per_participant,
    ));
    let actions = ActionRegistry::with_builtin();
    let action_names: Vec<String> = actions.names().into_iter().map(str::to_string).collect();
    tracing::info!(actions = ?action_names, "action handlers registered");

    let responder = Arc::new(ResponseRouter::new(
        transport.clone(),
        history.clone(),
        actions,
        &cfg.escalation,
    ));
    let dispatcher = Arc::new(IntentDispatcher::new(
        sessions.clone(),
        profiles,
        nlu,
        transport,
        responder,
    ));

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(cfg.gateway.queue_capacity);
    let shutdown = CancellationToken::new();
    let gateway_handle = Gateway::new(dispatcher, inbound_rx).start(shutdown.child_token());
    tracing::info!("gateway started");

    let state = Arc::new(AppState {
        started_at,
        sessions,
        history,
        actions: action_names,
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(state))
        .merge(webhook::router(
            inbound_tx,
            cfg.messenger.verify_token.clone(),
            cfg.app_secret().map(str::to_string),
        ))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "moodgate serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");

    shutdown.cancel();
    match gateway_handle.await {
        Ok(()) => tracing::info!("gateway shutdown completed"),
        Err(e) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
    }

    Ok(())
}

fn bind_addr(cfg: &GatewayConfig) -> Result<SocketAddr> {
    let raw = format!("{}:{}", cfg.server.host.trim(), cfg.server.port);
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {raw}: {e}"))
}

fn build_transport(cfg: &GatewayConfig) -> Result<GraphMessengerAdapter> {
    let mut adapter = GraphMessengerAdapter::new(&cfg.messenger.page_access_token)?;
    if let Some(base) = cfg.messenger.graph_api_base.as_deref() {
        adapter = adapter.with_api_base(base);
    }
    if let Some(app_id) = cfg.messenger.handover_app_id.as_deref() {
        adapter = adapter.with_handover_app_id(app_id);
    }
    Ok(adapter)
}

fn build_profiles(cfg: &GatewayConfig) -> Result<GraphProfileClient> {
    let mut client = GraphProfileClient::new(&cfg.messenger.page_access_token)?;
    if let Some(base) = cfg.messenger.graph_api_base.as_deref() {
        client = client.with_api_base(base);
    }
    Ok(client)
}

fn build_nlu(cfg: &GatewayConfig) -> Result<DialogflowClient> {
    let mut client = DialogflowClient::new(
        &cfg.nlu.project_id,
        &cfg.nlu.access_token,
        &cfg.nlu.language_code,
    )?;
    if let Some(base) = cfg.nlu.api_base.as_deref() {
        client = client.with_api_base(base);
    }
    Ok(client)
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}
