//! Route definitions for the JSON agent service

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::header,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{
    request_logging_middleware, AgentHealth, AppState, HealthResponse, HealthStatus, ModifyForm,
    ModifyResponse,
};
use crate::error::ApiError;

/// Landing page served when `index.html` is absent
pub const PLACEHOLDER_PAGE: &str = "<h3>JSON Agent API</h3>";

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/", get(index))
        .route("/api/modify", post(modify_json))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET / - landing page
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Html(page),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Serving placeholder page");
            Html(PLACEHOLDER_PAGE.to_string())
        }
    }
}

/// POST /api/modify - apply a prompt to a JSON document
async fn modify_json(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ModifyResponse>, ApiError> {
    let start = Instant::now();

    let result = modify(&state, multipart).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };
    state
        .metrics
        .record_request(outcome, start.elapsed().as_secs_f64());

    result.map(|data| Json(ModifyResponse::success(data)))
}

async fn modify(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Value, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let form = ModifyForm::from_multipart(multipart).await?;

    let prompt = form.prompt()?;
    let document = form.document()?;
    let schema = state.resolve_schema(form.schema_path())?;

    tracing::info!(
        prompt_len = prompt.len(),
        schema = ?schema.as_ref().and_then(|s| s.source()),
        "Processing modify request"
    );

    state
        .workflow
        .run(prompt, document, schema.as_ref())
        .await
        .map_err(|e| {
            tracing::info!(
                code = e.error_code(),
                user_error = e.is_user_error(),
                validation = e.is_validation_failure(),
                "Mutation failed"
            );
            ApiError::from(e)
        })
}

/// GET /health - health check
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let agent = state.workflow.agent();
    let configured = agent.is_configured();

    Json(HealthResponse {
        status: if configured {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        agent: AgentHealth {
            name: agent.name().to_string(),
            configured,
        },
        default_schema: state
            .default_schema
            .as_ref()
            .map(|p| p.display().to_string()),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /metrics - Prometheus text exposition
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => ApiError::InternalError(format!("Failed to encode metrics: {}", e))
            .into_response(),
    }
}
