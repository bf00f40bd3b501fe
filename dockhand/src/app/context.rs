//! Application context: every long-lived component, built once

use std::sync::Arc;

use tracing::info;

use crate::compose::{ComposeRuntime, RuntimeOrchestrator};
use crate::credentials::{AgeCodec, CredentialCodec};
use crate::deploy::coordinator::{self, DeploymentCoordinator};
use crate::errors::DockhandError;
use crate::filesys::dir::Dir;
use crate::git::sync::GitOptions;
use crate::git::{GitSync, GitSyncEngine};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::storage::{JsonFileStore, WorkloadStore};

/// Shared application components
pub struct AppContext {
    pub layout: StorageLayout,
    pub settings: Settings,
    pub store: Arc<dyn WorkloadStore>,
    pub coordinator: Arc<DeploymentCoordinator>,
}

impl AppContext {
    /// Build the production components from the layout and settings
    pub async fn init(layout: StorageLayout, settings: Settings) -> Result<Self, DockhandError> {
        info!("Initializing application context in {}", layout.base_dir.display());

        layout.setup().await?;
        let workspace = Dir::new(settings.workspace_dir(&layout));
        workspace.create().await?;

        let codec: Arc<dyn CredentialCodec> =
            Arc::new(AgeCodec::load_or_create(&settings.key_file(&layout))?);
        let store: Arc<dyn WorkloadStore> =
            Arc::new(JsonFileStore::open(layout.state_file()).await?);
        let git: Arc<dyn GitSync> = Arc::new(GitSyncEngine::new(GitOptions {
            timeout: settings.git_timeout(),
        }));
        let runtime: Arc<dyn ComposeRuntime> =
            Arc::new(RuntimeOrchestrator::new((&settings.runtime).into()));

        Ok(Self::from_parts(layout, settings, store, git, runtime, codec))
    }

    /// Assemble a context from explicit components
    pub fn from_parts(
        layout: StorageLayout,
        settings: Settings,
        store: Arc<dyn WorkloadStore>,
        git: Arc<dyn GitSync>,
        runtime: Arc<dyn ComposeRuntime>,
        codec: Arc<dyn CredentialCodec>,
    ) -> Self {
        let coordinator = Arc::new(DeploymentCoordinator::new(
            coordinator::Options {
                workspace_dir: settings.workspace_dir(&layout),
            },
            store.clone(),
            git,
            runtime,
            codec,
        ));

        Self {
            layout,
            settings,
            store,
            coordinator,
        }
    }

    /// Release resources held by the context
    pub async fn shutdown(&self) -> Result<(), DockhandError> {
        info!("Shutting down application context...");
        // every store mutation is persisted as it happens; nothing to flush
        Ok(())
    }
}
