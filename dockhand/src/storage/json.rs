//! JSON file store.
//!
//! The state file is the source of truth for every process sharing it. Each
//! mutation takes an exclusive advisory lock on a sibling `.lock` file,
//! reloads the state from disk, applies the change to the affected records
//! and rewrites the file through a temporary file. Reads load the file
//! directly since writes replace it atomically.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::DockhandError;
use crate::filesys::file::File;
use crate::models::deployment::Deployment;
use crate::models::workload::Workload;
use crate::storage::memory::StoreState;
use crate::storage::store::WorkloadStore;

pub struct JsonFileStore {
    file: File,
    lock_path: PathBuf,
    // serializes mutations within this process; the file lock covers other processes
    writer: Mutex<()>,
}

/// Held for the duration of a mutation; closing the file releases the lock
struct StateLock {
    _file: std::fs::File,
}

impl JsonFileStore {
    /// Open the state file, starting empty if it does not exist
    pub async fn open(file: File) -> Result<Self, DockhandError> {
        let mut lock_name = file.path().as_os_str().to_owned();
        lock_name.push(".lock");
        let store = Self {
            lock_path: PathBuf::from(lock_name),
            file,
            writer: Mutex::new(()),
        };

        let state = store.load().await?;
        info!(
            "Loaded {} workload(s) and {} deployment(s) from {}",
            state.workloads.len(),
            state.deployments.len(),
            store.file.path().display()
        );
        Ok(store)
    }

    async fn load(&self) -> Result<StoreState, DockhandError> {
        if !self.file.exists().await {
            return Ok(StoreState::default());
        }
        self.file.read_json::<StoreState>().await.map_err(|e| {
            DockhandError::PersistenceError(format!(
                "Failed to load state from {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn lock(&self) -> Result<StateLock, DockhandError> {
        let path = self.lock_path.clone();
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<StateLock> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            fs2::FileExt::lock_exclusive(&file)?;
            Ok(StateLock { _file: file })
        })
        .await
        .map_err(|e| DockhandError::Internal(format!("State lock task failed: {}", e)))?;

        locked.map_err(|e| {
            DockhandError::PersistenceError(format!(
                "Failed to lock {}: {}",
                self.lock_path.display(),
                e
            ))
        })
    }

    /// Reload under the lock, apply `mutate` and persist. Nothing is written
    /// when `mutate` fails.
    async fn mutate<F>(&self, mutate: F) -> Result<(), DockhandError>
    where
        F: FnOnce(&mut StoreState) -> Result<(), DockhandError> + Send,
    {
        let _writer = self.writer.lock().await;
        let _lock = self.lock().await?;

        let mut state = self.load().await?;
        mutate(&mut state)?;

        self.file.write_json(&state).await.map_err(|e| {
            DockhandError::PersistenceError(format!(
                "Failed to write {}: {}",
                self.file.path().display(),
                e
            ))
        })?;
        debug!("Persisted state to {}", self.file.path().display());
        Ok(())
    }
}

#[async_trait]
impl WorkloadStore for JsonFileStore {
    async fn create_workload(&self, workload: &Workload) -> Result<(), DockhandError> {
        self.mutate(|state| state.create_workload(workload)).await
    }

    async fn update_workload(&self, workload: &Workload) -> Result<(), DockhandError> {
        self.mutate(|state| state.update_workload(workload)).await
    }

    async fn delete_workload(&self, id: &str) -> Result<(), DockhandError> {
        self.mutate(|state| state.delete_workload(id)).await
    }

    async fn find_workload(&self, id: &str) -> Result<Workload, DockhandError> {
        self.load().await?.find_workload(id)
    }

    async fn list_workloads(&self) -> Result<Vec<Workload>, DockhandError> {
        Ok(self.load().await?.workloads)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError> {
        self.mutate(|state| state.create_deployment(deployment)).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError> {
        self.mutate(|state| state.update_deployment(deployment)).await
    }

    async fn find_deployment(&self, id: &str) -> Result<Deployment, DockhandError> {
        self.load().await?.find_deployment(id)
    }

    async fn list_deployments(&self, workload_id: &str) -> Result<Vec<Deployment>, DockhandError> {
        Ok(self.load().await?.list_deployments(workload_id))
    }

    async fn delete_deployments(&self, workload_id: &str) -> Result<(), DockhandError> {
        self.mutate(|state| {
            state.delete_deployments(workload_id);
            Ok(())
        })
        .await
    }
}
