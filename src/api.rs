//! REST API server for the ERP intelligence router
//!
//! Accepts a multipart request, stages the optional upload, runs the
//! orchestrator and reports `{answer, agent_used}`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{Orchestrator, RunRequest};
use crate::config::Settings;
use crate::error::{ErrorKind, OrchestrationError};
use crate::staging::StagedFile;
use crate::state::UNKNOWN_AGENT;

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub answer: String,
    pub agent_used: String,
    /// Routing steps taken for this run
    #[serde(default)]
    pub trace: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    pub agent_used: String,
    pub timestamp: String,
}

/// Failure reported to the caller, with the status derived from its kind
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    agent_used: &'static str,
}

impl ApiError {
    fn from_error(error: &OrchestrationError, agent_used: &'static str) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
            agent_used,
        }
    }

    fn validation(detail: impl Into<String>) -> Self {
        Self::from_error(&OrchestrationError::Validation(detail.into()), UNKNOWN_AGENT)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Classification | ErrorKind::Generation => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            kind: self.kind.as_str().to_string(),
            agent_used: self.agent_used.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status_for(self.kind), Json(body)).into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub settings: Arc<Settings>,
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

#[derive(Default)]
struct RunForm {
    user_query: Option<String>,
    user_id: Option<String>,
    staged: Option<StagedFile>,
}

async fn read_form(mut multipart: Multipart, upload_dir: &Path) -> Result<RunForm, ApiError> {
    let mut form = RunForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "user_query" | "user_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("unreadable field {}: {}", name, e)))?;
                if name == "user_query" {
                    form.user_query = Some(value);
                } else {
                    form.user_id = Some(value);
                }
            }
            "user_file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("unreadable upload: {}", e)))?;

                // Browsers send an empty part when no file was picked
                if bytes.is_empty() {
                    continue;
                }

                let staged = StagedFile::write(upload_dir, &file_name, &bytes)
                    .await
                    .map_err(|e| ApiError::from_error(&OrchestrationError::Io(e), UNKNOWN_AGENT))?;
                info!(path = %staged.path().display(), bytes = bytes.len(), "Upload staged");
                form.staged = Some(staged);
            }
            other => warn!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::validation(format!("{} is required", field)))
}

/// =============================
/// Endpoints
/// =============================

async fn root(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "System Online",
        "project": state.settings.project_name,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn run_agent(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<RunResponse>, ApiError> {
    let form = read_form(multipart, &state.settings.upload_dir).await?;

    let query = required(form.user_query, "user_query")?;
    let user_id = stable_uuid_from_string(&required(form.user_id, "user_id")?);

    info!(
        user_id = %user_id,
        has_file = form.staged.is_some(),
        "Received agent run request"
    );

    let mut request = RunRequest::new(query).with_user(user_id);
    if let Some(staged) = &form.staged {
        request = request.with_file(staged.path());
    }

    // `form.staged` lives until the response is built, then the file is removed
    match state.orchestrator.run(request).await {
        Ok(run) => Ok(Json(RunResponse {
            answer: run.answer(),
            agent_used: run.agent_used().to_string(),
            trace: run.trace().to_vec(),
        })),
        Err(failure) => Err(ApiError::from_error(&failure.error, failure.agent_used())),
    }
}

/// =============================
/// Router
/// =============================

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: ApiState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.settings));
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/agent/run", post(run_agent))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(middleware)
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
