//! Persistence repository for workloads and deployments

use async_trait::async_trait;

use crate::errors::DockhandError;
use crate::models::deployment::Deployment;
use crate::models::workload::Workload;

/// Durable record of workloads and their deployment history.
///
/// Updates are whole-record and last-write-wins. Lookups that miss return
/// [`DockhandError::NotFound`].
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn create_workload(&self, workload: &Workload) -> Result<(), DockhandError>;

    async fn update_workload(&self, workload: &Workload) -> Result<(), DockhandError>;

    async fn delete_workload(&self, id: &str) -> Result<(), DockhandError>;

    async fn find_workload(&self, id: &str) -> Result<Workload, DockhandError>;

    /// All workloads, oldest first
    async fn list_workloads(&self) -> Result<Vec<Workload>, DockhandError>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError>;

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), DockhandError>;

    async fn find_deployment(&self, id: &str) -> Result<Deployment, DockhandError>;

    /// Deployments of one workload, newest first
    async fn list_deployments(&self, workload_id: &str) -> Result<Vec<Deployment>, DockhandError>;

    async fn delete_deployments(&self, workload_id: &str) -> Result<(), DockhandError>;
}

pub(crate) fn workload_not_found(id: &str) -> DockhandError {
    DockhandError::NotFound(format!("workload {}", id))
}

pub(crate) fn deployment_not_found(id: &str) -> DockhandError {
    DockhandError::NotFound(format!("deployment {}", id))
}
