//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DockhandError;
use crate::server::handlers::{
    config_handler, create_workload_handler, delete_workload_handler, deploy_handler,
    deployments_handler, get_workload_handler, health_handler, list_workloads_handler,
    logs_handler, status_handler, stop_handler, update_workload_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Workloads
        .route(
            "/workloads",
            get(list_workloads_handler).post(create_workload_handler),
        )
        .route(
            "/workloads/{id}",
            get(get_workload_handler)
                .patch(update_workload_handler)
                .delete(delete_workload_handler),
        )
        // Lifecycle
        .route("/workloads/{id}/deploy", post(deploy_handler))
        .route("/workloads/{id}/stop", post(stop_handler))
        // Inspection
        .route("/workloads/{id}/logs", get(logs_handler))
        .route("/workloads/{id}/config", get(config_handler))
        .route("/workloads/{id}/status", get(status_handler))
        .route("/workloads/{id}/deployments", get(deployments_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DockhandError>>, DockhandError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DockhandError::ServerError(format!("Failed to bind {}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DockhandError::ServerError(e.to_string()))
    });

    Ok(handle)
}
