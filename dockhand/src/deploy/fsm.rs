//! State machines for workloads and deployment records

use crate::models::deployment::DeploymentStatus;
use crate::models::workload::WorkloadStatus;

/// Workload lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadEvent {
    /// Repository cloned and record created
    Created,

    /// Containers created and started
    DeploySucceeded,

    /// Any deploy phase failed
    DeployFailed,

    /// Containers stopped and removed
    Stopped,
}

/// Deployment record event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Every phase succeeded
    Complete,

    /// A phase failed with the given reason
    Fail(String),
}

impl WorkloadStatus {
    /// Process an event and return the next status
    pub fn next(&self, event: &WorkloadEvent) -> Result<WorkloadStatus, String> {
        let next = match (self, event) {
            (WorkloadStatus::Unknown, WorkloadEvent::Created) => WorkloadStatus::Stopped,

            // Error is not terminal: a later deploy recovers it
            (_, WorkloadEvent::DeploySucceeded) => WorkloadStatus::Running,
            (_, WorkloadEvent::DeployFailed) => WorkloadStatus::Error,
            (_, WorkloadEvent::Stopped) => WorkloadStatus::Stopped,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };
        Ok(next)
    }
}

impl DeploymentStatus {
    /// Process an event and return the next status
    pub fn next(&self, event: &DeploymentEvent) -> Result<DeploymentStatus, String> {
        match (self, event) {
            (DeploymentStatus::Started, DeploymentEvent::Complete) => Ok(DeploymentStatus::Completed),
            (DeploymentStatus::Started, DeploymentEvent::Fail(_)) => Ok(DeploymentStatus::Failed),
            (state, event) => Err(format!("Invalid transition: {:?} -> {:?}", state, event)),
        }
    }
}
