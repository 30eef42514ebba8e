use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::{get, post}, Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::agent::tools::RegisteredTool;
use crate::conversation::ConversationService;
use crate::error::AssistantError;
use crate::session::SessionStore;
use crate::settings::{RequestOverrides, SessionSettings};
use crate::summary::{Summary, SummaryKind, SummaryService};

#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<ConversationService>,
    pub summaries: Arc<SummaryService>,
    pub metrics: Option<PrometheusHandle>,
    pub started: Instant,
}

impl AppState {
    pub fn new(conversations: Arc<ConversationService>, summaries: Arc<SummaryService>, metrics: Option<PrometheusHandle>) -> Self {
        Self { conversations, summaries, metrics, started: Instant::now() }
    }
}

/// Error body shared by every route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl From<AssistantError> for ApiError {
    fn from(e: AssistantError) -> Self {
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::bad_request(r.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), message = %self.message, "request failed");
        }
        let body = json!({
            "error": error_name(self.status),
            "message": self.message,
            "statusCode": self.status.as_u16(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        (self.status, Json(body)).into_response()
    }
}

fn error_name(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BadRequest",
        StatusCode::NOT_FOUND => "NotFound",
        _ => "InternalServerError",
    }
}

fn session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("Session {raw} not found")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartBody {
    pub session_id: Option<String>,
    pub use_context: Option<bool>,
    pub settings: Option<SessionSettings>,
}

async fn start_conversation(
    State(state): State<AppState>,
    body: Option<Json<StartBody>>,
) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    // an unparseable id is treated like an unknown one
    let existing = body.session_id.as_deref().map(|raw| Uuid::parse_str(raw).unwrap_or_else(|_| Uuid::nil()));
    let started = state
        .conversations
        .start_conversation(existing, body.use_context.unwrap_or(true), body.settings)
        .await;
    (StatusCode::CREATED, Json(started))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendBody {
    pub message: String,
    pub context: Option<Value>,
    pub file_ids: Vec<String>,
    pub overrides: RequestOverrides,
}

async fn send_message(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    payload: Result<Json<SendBody>, JsonRejection>,
) -> Result<Json<crate::conversation::Reply>, ApiError> {
    let id = session_id(&raw)?;
    let Json(body) = payload?;
    if body.context.is_some() {
        tracing::debug!(session = %id, "client-supplied context ignored");
    }
    let reply = state.conversations.send_message(id, &body.message, &body.file_ids, &body.overrides).await?;
    Ok(Json(reply))
}

async fn history(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<crate::conversation::History>, ApiError> {
    Ok(Json(state.conversations.history(session_id(&raw)?).await?))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = session_id(&raw)?;
    state.conversations.clear(id).await?;
    Ok(Json(json!({"message": "Conversation cleared successfully", "sessionId": id})))
}

async fn refresh_context(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<crate::conversation::Refreshed>, ApiError> {
    Ok(Json(state.conversations.refresh_context(session_id(&raw)?).await?))
}

#[derive(Debug, Serialize)]
struct ToolInfo<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a RegisteredTool> for ToolInfo<'a> {
    fn from(t: &'a RegisteredTool) -> Self {
        Self { name: t.name(), description: t.description(), parameters: &t.spec()["function"]["parameters"] }
    }
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let registry = state.conversations.assistant().registry();
    let tools: Vec<ToolInfo> = registry.list().map(ToolInfo::from).collect();
    Json(json!({"tools": tools, "count": tools.len()}))
}

async fn get_tool(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let registry = state.conversations.assistant().registry();
    let tool = registry.find(&name).ok_or_else(|| ApiError::not_found(format!("Tool {name} not found")))?;
    Ok(Json(json!({"tool": ToolInfo::from(tool)})))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub ignore_cache: Option<String>,
}

impl SummaryQuery {
    /// Only the literal `true` bypasses the cache.
    fn ignore_cache(&self) -> bool {
        self.ignore_cache.as_deref() == Some("true")
    }
}

async fn overview_summary(State(state): State<AppState>, Query(q): Query<SummaryQuery>) -> Result<Json<Summary>, ApiError> {
    Ok(Json(state.summaries.summarize(SummaryKind::Overview, q.ignore_cache()).await?))
}

async fn weekly_summary(State(state): State<AppState>, Query(q): Query<SummaryQuery>) -> Result<Json<Summary>, ApiError> {
    Ok(Json(state.summaries.summarize(SummaryKind::Weekly, q.ignore_cache()).await?))
}

async fn summary_cache_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"cache_stats": state.summaries.cache_stats().await, "timestamp": Utc::now().to_rfc3339()}))
}

async fn clear_summary_cache(State(state): State<AppState>) -> Json<Value> {
    state.summaries.clear_cache().await;
    Json(json!({"message": "Summary cache cleared successfully", "timestamp": Utc::now().to_rfc3339()}))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started.elapsed().as_secs_f64(),
        "sessions": state.conversations.store().len().await,
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| ApiError::not_found("metrics recorder not installed"))
}

async fn fallback() -> ApiError {
    ApiError::not_found("Route not found")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/conversations", post(start_conversation))
        .route("/api/conversations/:id", axum::routing::delete(delete_conversation))
        .route("/api/conversations/:id/messages", post(send_message))
        .route("/api/conversations/:id/history", get(history))
        .route("/api/conversations/:id/refresh", post(refresh_context))
        .route("/api/summaries/overview", get(overview_summary))
        .route("/api/summaries/weekly", get(weekly_summary))
        .route("/api/summaries/cache", axum::routing::delete(clear_summary_cache))
        .route("/api/summaries/cache/stats", get(summary_cache_stats))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name", get(get_tool))
        .route("/api/health", get(health))
        .route("/metrics", get(render_metrics))
        .fallback(fallback)
        .with_state(state)
}

/// Periodically drop idle sessions until the returned task is aborted.
pub fn spawn_sweeper(store: Arc<SessionStore>, max_age_hours: i64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.cleanup_expired(max_age_hours).await;
        }
    })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for ctrl-c; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

pub async fn serve(addr: SocketAddr, state: AppState, max_age_hours: i64, sweep_every: Duration) -> anyhow::Result<()> {
    let sweeper = spawn_sweeper(state.conversations.store().clone(), max_age_hours, sweep_every);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "research assistant listening");
    let served = axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await;
    sweeper.abort();
    served?;
    Ok(())
}
