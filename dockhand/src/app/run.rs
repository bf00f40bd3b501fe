//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::context::AppContext;
use crate::app::options::{AppOptions, LifecycleOptions};
use crate::errors::DockhandError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::poller;

/// Run the dockhand service until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DockhandError> {
    info!("Initializing dockhand...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager =
        ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start dockhand: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppContext>, DockhandError> {
    let context = Arc::new(
        AppContext::init(options.layout.clone(), options.settings.clone()).await?,
    );
    shutdown_manager.with_app_context(context.clone())?;

    if options.enable_server {
        init_server(options, context.clone(), shutdown_manager, shutdown_tx.subscribe()).await?;
    }

    if options.enable_poller {
        init_poller_worker(
            options.poller.clone(),
            context.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(context)
}

async fn init_poller_worker(
    options: poller::Options,
    context: Arc<AppContext>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DockhandError> {
    info!("Initializing auto-deploy poller...");

    let coordinator = context.coordinator.clone();

    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            coordinator.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)?;
    Ok(())
}

async fn init_server(
    options: &AppOptions,
    context: Arc<AppContext>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DockhandError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(context.coordinator.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_context: Option<Arc<AppContext>>,
    server_handle: Option<JoinHandle<Result<(), DockhandError>>>,
    poller_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_context: None,
            server_handle: None,
            poller_worker_handle: None,
        }
    }

    pub fn with_app_context(&mut self, context: Arc<AppContext>) -> Result<(), DockhandError> {
        if self.app_context.is_some() {
            return Err(DockhandError::ShutdownError(
                "app_context already set".to_string(),
            ));
        }
        self.app_context = Some(context);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DockhandError> {
        if self.poller_worker_handle.is_some() {
            return Err(DockhandError::ShutdownError(
                "poller_handle already set".to_string(),
            ));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), DockhandError>>,
    ) -> Result<(), DockhandError> {
        if self.server_handle.is_some() {
            return Err(DockhandError::ShutdownError(
                "server_handle already set".to_string(),
            ));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DockhandError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DockhandError> {
        info!("Shutting down dockhand...");

        // 1. Poller worker (finishes an in-flight deploy first)
        if let Some(handle) = self.poller_worker_handle.take() {
            handle
                .await
                .map_err(|e| DockhandError::ShutdownError(e.to_string()))?;
        }

        // 2. HTTP server
        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| DockhandError::ShutdownError(e.to_string()))??;
        }

        // 3. App context
        if let Some(context) = self.app_context.take() {
            context.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
