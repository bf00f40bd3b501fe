//! In-memory store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::DockhandError;
use crate::models::deployment::Deployment;
use crate::models::workload::Workload;
use crate::storage::store::{deployment_not_found, workload_not_found, WorkloadStore};

/// Every record, shared by the memory and JSON file stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub workloads: Vec<Workload>,

    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

impl StoreState {
    pub(crate) fn create_workload(&mut self, workload: &Workload) -> Result<(), DockhandError> {
        if self.workloads.iter().any(|w| w.id == workload.id) {
            return Err(DockhandError::PersistenceError(format!(
                "workload {} already exists",
                workload.id
            )));
        }
        self.workloads.push(workload.clone());
        Ok(())
    }

    pub(crate) fn update_workload(&mut self, workload: &Workload) -> Result<(), DockhandError> {
        let slot = self
            .workloads
            .iter_mut()
            .find(|w| w.id == workload.id)
            .ok_or_else(|| workload_not_found(&workload.id))?;
        *slot = workload.clone();
        Ok(())
    }

    pub(crate) fn delete_workload(&mut self, id: &str) -> Result<(), DockhandError> {
        let before = self.workloads.len();
        self.workloads.retain(|w| w.id != id);
        if self.workloads.len() == before {
            return Err(workload_not_found(id));
        }
        Ok(())
    }

    pub(crate) fn find_workload(&self, id: &str) -> Result<Workload, DockhandError> {
        self.workloads
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| workload_not_found(id))
    }

    pub(crate) fn create_deployment(&mut self, deployment: &Deployment) -> Result<(), DockhandError> {
        if self.deployments.iter().any(|d| d.id == deployment.id) {
            return Err(DockhandError::PersistenceError(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        self.deployments.push(deployment.clone());
        Ok(())
    }

    pub(crate) fn update_deployment(&mut self, deployment: &Deployment) -> Result<(), DockhandError> {
        let slot = self
            .deployments
            .iter_mut()
            .find(|d| d.id == deployment.id)
            .ok_or_else(|| deployment_not_found(&deployment.id))?;
        *slot = deployment.clone();
        Ok(())
    }

    pub(crate) fn find_deployment(&self, id: &str) -> Result<Deployment, DockhandError> {
        self.deployments
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| deployment_not_found(id))
    }

    pub(crate) fn list_deployments(&self, workload_id: &str) -> Vec<Deployment> {
        // insertion order breaks ties between equal timestamps
        let mut deployments: Vec<(usize, Deployment)> = self
            .deployments
            .iter()
            .filter(|d| d.workload_id == workload_id)
            .cloned()
            .enumerate()
            .collect();
        deployments.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        deployments.into_iter().map(|(_, d)| d).collect()
    }

    pub(crate) fn delete_deployments(&mut self, workload_id: &str) {
        self.deployments.retain(|d| d.workload_id != workload_id);
    }
}

/// Non-durable store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadStore for MemoryStore {
    async fn create_workload(&self, workload: &Workload) -> Result<(), DockhandError> {
        self.state.write().await.create_workload(workload)
    }

    async fn update_workload(&self, workload: &Workload) -> Result<(), DockhandError> {
        self.state.write().await.update_workload(workload)
    }

    async fn delete_workload(&self, id: &str) -> Result<(), DockhandError> {
        self.state.write().await.delete_workload(id)
    }

    async fn find_workload(&self, id: &str) -> Result<Workload, DockhandError> {
        self.state.read().await.find_workload(id)
    }

    async fn list_workloads(&self) -> Result<Vec<Workload>, DockhandError> {
        Ok(self.state.read().await.workloads.clone())
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError> {
        self.state.write().await.create_deployment(deployment)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError> {
        self.state.write().await.update_deployment(deployment)
    }

    async fn find_deployment(&self, id: &str) -> Result<Deployment, DockhandError> {
        self.state.read().await.find_deployment(id)
    }

    async fn list_deployments(&self, workload_id: &str) -> Result<Vec<Deployment>, DockhandError> {
        Ok(self.state.read().await.list_deployments(workload_id))
    }

    async fn delete_deployments(&self, workload_id: &str) -> Result<(), DockhandError> {
        self.state.write().await.delete_deployments(workload_id);
        Ok(())
    }
}
