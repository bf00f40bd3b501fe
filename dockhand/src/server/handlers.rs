//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::compose::{ExecMode, LogsOptions};
use crate::credentials::CredentialKind;
use crate::errors::DockhandError;
use crate::models::stream::StreamMessage;
use crate::models::workload::{CreateWorkload, UpdateWorkload, Workload, WorkloadStatus};
use crate::server::state::ServerState;
use crate::utils::version_info;

const STREAM_BUFFER: usize = 64;

// ================================== ERRORS ====================================== //

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`DockhandError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub DockhandError);

impl From<DockhandError> for ApiError {
    fn from(err: DockhandError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DockhandError::NotFound(_) => StatusCode::NOT_FOUND,
            DockhandError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: friendly_message(&self.0),
            }),
        )
            .into_response()
    }
}

/// Translate well-known git failures into actionable messages
pub fn friendly_message(err: &DockhandError) -> String {
    let text = err.to_string();
    let lower = text.to_lowercase();

    let is_git = matches!(err, DockhandError::GitError(_));
    if is_git
        && (lower.contains("ssh private key")
            || lower.contains("private key file")
            || (lower.contains("failed to parse") && lower.contains("key")))
    {
        return "The SSH private key is missing or invalid. Provide the full PEM-encoded key."
            .to_string();
    }
    if is_git
        && (lower.contains("authentication")
            || lower.contains("auth failed")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("credentials"))
    {
        return "Authentication with the repository failed. Check the username, token or SSH key."
            .to_string();
    }
    if is_git && (lower.contains("repository not found") || lower.contains("404")) {
        return "Repository not found. Check the URL and that the credentials can access it."
            .to_string();
    }
    text
}

// ================================== HEALTH ====================================== //

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "dockhand".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// ================================= WORKLOADS ==================================== //

/// Workload as returned by the API; credentials are reduced to their kind
#[derive(Debug, Serialize)]
pub struct WorkloadResponse {
    pub id: String,
    pub name: String,
    pub repository_url: String,
    pub branch: String,
    pub credentials: Option<CredentialKind>,
    pub working_dir: String,
    pub compose_files: Vec<String>,
    pub environment: Vec<String>,
    pub status: WorkloadStatus,
    pub last_commit: Option<String>,
    pub auto_deploy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Workload> for WorkloadResponse {
    fn from(workload: Workload) -> Self {
        Self {
            credentials: workload.credentials.as_ref().map(|c| c.kind),
            working_dir: workload.working_dir.display().to_string(),
            id: workload.id,
            name: workload.name,
            repository_url: workload.repository_url,
            branch: workload.branch,
            compose_files: workload.compose_files,
            environment: workload.environment,
            status: workload.status,
            last_commit: workload.last_commit,
            auto_deploy: workload.auto_deploy,
            created_at: workload.created_at,
            updated_at: workload.updated_at,
        }
    }
}

pub async fn list_workloads_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    let workloads = state.coordinator.list().await?;
    Ok(Json(
        workloads
            .into_iter()
            .map(WorkloadResponse::from)
            .collect::<Vec<_>>(),
    ))
}

pub async fn create_workload_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CreateWorkload>,
) -> Result<impl IntoResponse, ApiError> {
    let workload = state.coordinator.create(request).await?;
    Ok((StatusCode::CREATED, Json(WorkloadResponse::from(workload))))
}

pub async fn get_workload_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workload = state.coordinator.get(&id).await?;
    Ok(Json(WorkloadResponse::from(workload)))
}

pub async fn update_workload_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateWorkload>,
) -> Result<impl IntoResponse, ApiError> {
    let workload = state.coordinator.update(&id, request).await?;
    Ok(Json(WorkloadResponse::from(workload)))
}

pub async fn delete_workload_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ================================= LIFECYCLE ==================================== //

/// Deploy query parameters
#[derive(Debug, Deserialize)]
pub struct DeployQuery {
    pub pull: Option<bool>,
}

/// One SSE event per stream message, named after its type
fn message_stream(
    rx: mpsc::Receiver<StreamMessage>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let message = rx.recv().await?;
        let event = Event::default()
            .event(message.kind.as_str())
            .data(message.content);
        Some((Ok::<_, Infallible>(event), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<DeployQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // unknown ids fail before the stream opens
    state.coordinator.get(&id).await?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let coordinator = state.coordinator.clone();
    let pull = query.pull.unwrap_or(true);
    tokio::spawn(async move {
        if let Err(e) = coordinator.deploy_streaming(&id, pull, tx).await {
            debug!("Streamed deploy of {} ended with error: {}", id, e);
        }
    });

    Ok(message_stream(rx))
}

pub async fn stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.coordinator.get(&id).await?;

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.stop_streaming(&id, tx).await {
            debug!("Streamed stop of {} ended with error: {}", id, e);
        }
    });

    Ok(message_stream(rx))
}

// ================================= INSPECTION =================================== //

/// Logs query parameters
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<u32>,
    #[serde(default)]
    pub timestamps: bool,
}

/// Logs response
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub stdout: String,
    pub stderr: String,
}

pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let options = LogsOptions {
        follow: false,
        tail: query.tail,
        timestamps: query.timestamps,
        services: vec![],
    };
    let output = state
        .coordinator
        .logs(&id, &options, ExecMode::Buffered)
        .await?;
    Ok(Json(LogsResponse {
        stdout: output.stdout,
        stderr: output.stderr,
    }))
}

pub async fn config_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coordinator.config(&id).await?))
}

pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coordinator.status(&id).await?))
}

pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.coordinator.list_deployments(&id).await?))
}
