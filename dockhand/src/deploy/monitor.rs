//! Aggregate stack status

use std::sync::Arc;

use tracing::debug;

use crate::compose::{ComposeProject, ComposeRuntime, StackStatus};
use crate::errors::DockhandError;

/// Stateless status derivation over the runtime's container report
#[derive(Clone)]
pub struct StatusMonitor {
    runtime: Arc<dyn ComposeRuntime>,
}

impl StatusMonitor {
    pub fn new(runtime: Arc<dyn ComposeRuntime>) -> Self {
        Self { runtime }
    }

    pub async fn status(&self, project: &ComposeProject) -> Result<StackStatus, DockhandError> {
        let status = self.runtime.status(project).await?;
        debug!(
            "{}: {:?} with {} container(s)",
            project.project_name,
            status.state,
            status.containers.len()
        );
        Ok(status)
    }
}
