//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentEvent;
use crate::errors::DockhandError;

/// Audit record of one deploy attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Owning workload
    pub workload_id: String,

    /// Commit checked out when the deployment started
    pub commit_hash: Option<String>,

    /// Current status
    pub status: DeploymentStatus,

    /// Captured runtime stdout
    #[serde(default)]
    pub stdout: String,

    /// Captured runtime stderr, plus the failure reason if any
    #[serde(default)]
    pub stderr: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// A new deployment in the `Started` state
    pub fn started(workload_id: &str, commit_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::utils::generate_uuid(),
            workload_id: workload_id.to_string(),
            commit_hash,
            status: DeploymentStatus::Started,
            stdout: String::new(),
            stderr: String::new(),
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Apply the single terminal transition together with the captured output
    pub fn finish(
        &mut self,
        event: DeploymentEvent,
        stdout: String,
        stderr: String,
    ) -> Result<(), DockhandError> {
        self.status = self
            .status
            .next(&event)
            .map_err(DockhandError::Internal)?;

        let mut stderr = stderr;
        if let DeploymentEvent::Fail(reason) = &event {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(reason);
        }

        let now = Utc::now();
        self.stdout = stdout;
        self.stderr = stderr;
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Unknown,
    Started,
    Completed,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }
}
