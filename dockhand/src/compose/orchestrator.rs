//! [`ComposeRuntime`] on top of the Compose CLI

use async_trait::async_trait;
use tracing::{debug, info};

use crate::compose::status::{parse_ps_output, StackStatus};
use crate::compose::volumes::{create_mount, pending_mounts};
use crate::compose::{command, exec};
use crate::compose::{
    CommandOutput, ComposeProject, ComposeRuntime, ExecMode, LogsOptions, RuntimeOptions,
};
use crate::errors::DockhandError;
use crate::models::stream::StreamMessage;

/// Runs Compose subcommands for workload projects
#[derive(Debug, Clone, Default)]
pub struct RuntimeOrchestrator {
    options: RuntimeOptions,
}

impl RuntimeOrchestrator {
    pub fn new(options: RuntimeOptions) -> Self {
        Self { options }
    }
}

/// Report a progress line to whoever is attached
async fn notify(mode: &ExecMode, line: String) {
    match mode {
        ExecMode::Streamed(tx) => {
            let _ = tx.send(StreamMessage::info(line)).await;
        }
        ExecMode::Piped => println!("{}", line),
        ExecMode::Buffered => {}
    }
}

#[async_trait]
impl ComposeRuntime for RuntimeOrchestrator {
    async fn create(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        info!("Creating containers for {}", project.project_name);
        exec::execute(&command::create(&self.options, project), mode).await
    }

    async fn initialize_volume_mounts(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<(), DockhandError> {
        let config = self.config(project).await?;
        let pending = pending_mounts(&config, &project.working_dir);
        debug!(
            "{} bind mount(s) to prepare for {}",
            pending.len(),
            project.project_name
        );

        for mount in &pending {
            let line = create_mount(mount).await?;
            notify(&mode, line).await;
        }
        Ok(())
    }

    async fn start(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        info!("Starting containers for {}", project.project_name);
        exec::execute(&command::start(&self.options, project), mode).await
    }

    async fn down(
        &self,
        project: &ComposeProject,
        remove_volumes: bool,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        info!("Stopping containers for {}", project.project_name);
        exec::execute(&command::down(&self.options, project, remove_volumes), mode).await
    }

    async fn logs(
        &self,
        project: &ComposeProject,
        options: &LogsOptions,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        exec::execute(&command::logs(&self.options, project, options), mode).await
    }

    async fn config(&self, project: &ComposeProject) -> Result<serde_json::Value, DockhandError> {
        let output =
            exec::execute(&command::config(&self.options, project), ExecMode::Buffered).await?;
        serde_json::from_str(&output.stdout).map_err(|e| {
            DockhandError::RuntimeError(format!("Failed to parse compose config: {}", e))
        })
    }

    async fn status(&self, project: &ComposeProject) -> Result<StackStatus, DockhandError> {
        let output =
            exec::execute(&command::status(&self.options, project), ExecMode::Buffered).await?;
        Ok(StackStatus::aggregate(parse_ps_output(&output.stdout)?))
    }
}
