//! HTTP message boundary
//!
//! The inspector UI and editor surfaces talk to the controller through
//! these routes. Every failure comes back as a `CommandResult` body.

use crate::cdp::TabInfo;
use crate::editor_queue::{QueuedEditor, QueuedEditorLauncher};
use crate::error::{AgentError, AgentResult};
use crate::replay::{ReplayRequest, ReplayResponse, Replayer};
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use intercept_common::{CommandResult, ControlRequest, ControlResponse, FailureKind, TabId};
use intercept_core::{CapturedRequest, ControllerHandle, RequestLog};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

type ApiError = (StatusCode, Json<CommandResult>);

/// Tabs the agent can offer for interception
#[async_trait]
pub trait TabDirectory: Send + Sync {
    async fn tabs(&self) -> Vec<TabInfo>;

    async fn open_tab(&self, url: &str) -> AgentResult<TabId>;
}

#[async_trait]
impl TabDirectory for crate::cdp::CdpHost {
    async fn tabs(&self) -> Vec<TabInfo> {
        crate::cdp::CdpHost::tabs(self).await
    }

    async fn open_tab(&self, url: &str) -> AgentResult<TabId> {
        crate::cdp::CdpHost::open_tab(self, url).await
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
    pub tabs: Arc<dyn TabDirectory>,
    pub editors: Arc<QueuedEditorLauncher>,
    pub log: Arc<RwLock<RequestLog>>,
    pub replayer: Arc<Replayer>,
}

#[derive(Serialize)]
pub struct TabsResponse {
    pub tabs: Vec<TabInfo>,
    /// Tabs with interception enabled
    pub intercepting: Vec<TabId>,
}

#[derive(Deserialize)]
pub struct OpenTabRequest {
    pub url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTabResponse {
    pub tab_id: TabId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsQuery {
    pub tab_id: Option<TabId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsResponse {
    pub requests: Vec<CapturedRequest>,
    pub total_count: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/messages", post(message_handler))
        .route("/tabs", get(list_tabs_handler).post(open_tab_handler))
        .route("/editors", get(list_editors_handler))
        .route(
            "/editors/:tab_id/:request_id",
            get(get_editor_handler).delete(close_editor_handler),
        )
        .route("/requests", get(list_requests_handler).delete(clear_requests_handler))
        .route("/replay", post(replay_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> AgentResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AgentError::Server(format!("Failed to bind {}: {}", addr, e)))?;
    info!("Message boundary listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AgentError::Server(format!("HTTP server failed: {}", e)))
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pending = state.controller.pending().await.map(|keys| keys.len()).ok();
    Json(serde_json::json!({
        "status": if pending.is_some() { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "intercept-agent",
        "pendingInterceptions": pending,
        "openEditors": state.editors.len(),
    }))
}

/// Control messages and SUBMIT_EDIT.
///
/// The body is parsed here rather than by the extractor so malformed
/// messages get a structured reply.
async fn message_handler(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Json<ControlResponse> {
    let request: ControlRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed control message");
            return Json(
                CommandResult::failure(FailureKind::Validation, format!("Invalid message: {}", e)).into(),
            );
        }
    };
    Json(state.controller.dispatch(request).await)
}

async fn list_tabs_handler(State(state): State<AppState>) -> Result<Json<TabsResponse>, ApiError> {
    let intercepting = state.controller.active_tabs().await.map_err(unavailable)?;
    Ok(Json(TabsResponse {
        tabs: state.tabs.tabs().await,
        intercepting,
    }))
}

async fn open_tab_handler(
    State(state): State<AppState>,
    Json(request): Json<OpenTabRequest>,
) -> Result<Json<OpenTabResponse>, ApiError> {
    let tab_id = state.tabs.open_tab(&request.url).await.map_err(|e| {
        (
            StatusCode::BAD_GATEWAY,
            Json(CommandResult::failure(FailureKind::Host, e.to_string())),
        )
    })?;
    Ok(Json(OpenTabResponse { tab_id }))
}

async fn list_editors_handler(State(state): State<AppState>) -> Json<Vec<QueuedEditor>> {
    Json(state.editors.open_editors())
}

async fn get_editor_handler(
    State(state): State<AppState>,
    Path((tab_id, request_id)): Path<(TabId, String)>,
) -> Result<Json<QueuedEditor>, ApiError> {
    state.editors.get(tab_id, &request_id).map(Json).ok_or_else(|| {
        not_found(format!(
            "No open editor for request {} on tab {}",
            request_id, tab_id
        ))
    })
}

/// The surface went away without submitting
async fn close_editor_handler(
    State(state): State<AppState>,
    Path((tab_id, request_id)): Path<(TabId, String)>,
) -> Result<Json<CommandResult>, ApiError> {
    let result = state
        .controller
        .editor_closed(tab_id, request_id)
        .await
        .map_err(unavailable)?;
    Ok(Json(result))
}

async fn list_requests_handler(
    State(state): State<AppState>,
    Query(query): Query<RequestsQuery>,
) -> Json<RequestsResponse> {
    let requests = state.log.read().await.requests(query.tab_id);
    Json(RequestsResponse {
        total_count: requests.len(),
        requests,
    })
}

async fn clear_requests_handler(State(state): State<AppState>) -> Json<CommandResult> {
    state.log.write().await.clear();
    Json(CommandResult::ok_with_message("Request log cleared"))
}

async fn replay_handler(
    State(state): State<AppState>,
    Json(request): Json<ReplayRequest>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let request = match request.capture_id.clone() {
        Some(id) => {
            let captured = state
                .log
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found(format!("No logged request with id {}", id)))?;
            request.based_on(&captured)
        }
        None => request,
    };

    state.replayer.send(request).await.map(Json).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(CommandResult::failure(FailureKind::Validation, e.to_string())),
        )
    })
}

fn not_found(message: String) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(CommandResult::failure(FailureKind::NotFound, message)),
    )
}

fn unavailable(err: intercept_core::InterceptError) -> ApiError {
    (StatusCode::SERVICE_UNAVAILABLE, Json(err.to_result()))
}
