//! Container runtime orchestration through the Compose CLI

pub mod command;
pub mod exec;
pub mod orchestrator;
pub mod status;
pub mod volumes;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::DockhandError;
use crate::models::stream::StreamMessage;
use crate::models::workload::Workload;

pub use orchestrator::RuntimeOrchestrator;
pub use status::{ContainerStatus, StackState, StackStatus};

/// Runtime binary configuration
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Executable, e.g. `docker` or `podman`
    pub binary: String,

    /// Arguments placed before the global flags, e.g. `["compose"]`
    pub subcommand: Vec<String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            subcommand: vec!["compose".to_string()],
        }
    }
}

/// Everything the runtime needs to address one workload's stack
#[derive(Debug, Clone)]
pub struct ComposeProject {
    pub project_name: String,
    pub working_dir: PathBuf,

    /// Relative to `working_dir`, in merge order
    pub compose_files: Vec<String>,

    /// `KEY=VALUE` assignments added to the subprocess environment
    pub environment: Vec<String>,
}

impl ComposeProject {
    pub fn for_workload(workload: &Workload) -> Self {
        Self {
            project_name: workload.project_name(),
            working_dir: workload.working_dir.clone(),
            compose_files: workload.compose_files.clone(),
            environment: workload.environment.clone(),
        }
    }
}

/// How a runtime subprocess is attached
#[derive(Debug, Clone)]
pub enum ExecMode {
    /// Capture all output and return it
    Buffered,

    /// Send every output line to the channel as it is produced
    Streamed(mpsc::Sender<StreamMessage>),

    /// Inherit this process's stdio
    Piped,
}

/// Output of a buffered run; empty for the other modes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Options for `logs`
#[derive(Debug, Clone, Default)]
pub struct LogsOptions {
    pub follow: bool,
    pub tail: Option<u32>,
    pub timestamps: bool,

    /// Restrict to these services; empty means all
    pub services: Vec<String>,
}

/// Container runtime primitives used by the deployment coordinator
#[async_trait]
pub trait ComposeRuntime: Send + Sync {
    /// Create containers without starting them
    async fn create(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError>;

    /// Create missing bind mount sources inside the working directory
    async fn initialize_volume_mounts(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<(), DockhandError>;

    /// Start the created containers in the background
    async fn start(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError>;

    /// Stop and remove the containers
    async fn down(
        &self,
        project: &ComposeProject,
        remove_volumes: bool,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError>;

    async fn logs(
        &self,
        project: &ComposeProject,
        options: &LogsOptions,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError>;

    /// Merged configuration of all compose files
    async fn config(&self, project: &ComposeProject) -> Result<serde_json::Value, DockhandError>;

    /// Per-container report with the aggregate state
    async fn status(&self, project: &ComposeProject) -> Result<StackStatus, DockhandError>;
}
