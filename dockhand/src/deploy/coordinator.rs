//! Deployment coordinator.
//!
//! Sequences git synchronization and runtime primitives into create, deploy,
//! stop and remove transactions, keeps the workload and deployment records in
//! step with the outcome, and relays progress to an optional live observer.
//!
//! Operations that change a workload hold that workload's lock for their
//! whole duration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::compose::{
    CommandOutput, ComposeProject, ComposeRuntime, ExecMode, LogsOptions, StackStatus,
};
use crate::credentials::{AuthDescriptor, CredentialCodec};
use crate::deploy::fsm::{DeploymentEvent, WorkloadEvent};
use crate::deploy::locks::WorkloadLocks;
use crate::deploy::monitor::StatusMonitor;
use crate::deploy::relay::{Capture, Observer, Relay};
use crate::errors::DockhandError;
use crate::filesys::dir::Dir;
use crate::git::GitSync;
use crate::models::deployment::Deployment;
use crate::models::stream::StreamMessage;
use crate::models::workload::{CreateWorkload, UpdateWorkload, Workload, WorkloadStatus};
use crate::storage::WorkloadStore;
use crate::utils::{generate_uuid, slugify};

/// Coordinator options
#[derive(Debug, Clone)]
pub struct Options {
    /// Parent of all workload working directories
    pub workspace_dir: PathBuf,
}

/// Orchestrates workloads end to end
pub struct DeploymentCoordinator {
    options: Options,
    store: Arc<dyn WorkloadStore>,
    git: Arc<dyn GitSync>,
    runtime: Arc<dyn ComposeRuntime>,
    codec: Arc<dyn CredentialCodec>,
    monitor: StatusMonitor,
    locks: WorkloadLocks,
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

fn describe_pull(before: Option<&str>, after: &str) -> String {
    match before {
        Some(before) if before == after => {
            format!("Already up to date at {}", short_hash(after))
        }
        Some(before) => format!("Updated {} -> {}", short_hash(before), short_hash(after)),
        None => format!("Checked out {}", short_hash(after)),
    }
}

impl DeploymentCoordinator {
    pub fn new(
        options: Options,
        store: Arc<dyn WorkloadStore>,
        git: Arc<dyn GitSync>,
        runtime: Arc<dyn ComposeRuntime>,
        codec: Arc<dyn CredentialCodec>,
    ) -> Self {
        let monitor = StatusMonitor::new(runtime.clone());
        Self {
            options,
            store,
            git,
            runtime,
            codec,
            monitor,
            locks: WorkloadLocks::new(),
        }
    }

    fn auth_for(&self, workload: &Workload) -> Result<Option<AuthDescriptor>, DockhandError> {
        workload
            .credentials
            .as_ref()
            .map(|sealed| self.codec.decrypt(sealed))
            .transpose()
            .map_err(|e| e.context(format!("Failed to decrypt credentials of {}", workload.name)))
    }

    async fn discard_working_dir(&self, dir: &Path) {
        let dir = Dir::new(dir);
        if dir.exists().await {
            if let Err(e) = dir.delete().await {
                warn!("Failed to remove {}: {}", dir.path().display(), e);
            }
        }
    }

    // ===================================== RECORDS ====================================== //

    pub async fn list(&self) -> Result<Vec<Workload>, DockhandError> {
        self.store.list_workloads().await
    }

    pub async fn get(&self, id: &str) -> Result<Workload, DockhandError> {
        self.store.find_workload(id).await
    }

    pub async fn list_deployments(&self, id: &str) -> Result<Vec<Deployment>, DockhandError> {
        let workload = self.store.find_workload(id).await?;
        self.store.list_deployments(&workload.id).await
    }

    /// Clone the repository and persist a new, stopped workload
    pub async fn create(&self, request: CreateWorkload) -> Result<Workload, DockhandError> {
        request.validate()?;

        let auth = request.auth.filter(|a| !a.is_empty());
        let repository_url = request.repository_url.trim().to_string();

        let branch = match request.branch.as_deref().map(str::trim) {
            Some(branch) if !branch.is_empty() => branch.to_string(),
            _ => self
                .git
                .default_branch(&repository_url, auth.as_ref())
                .await
                .map_err(|e| e.context("Failed to resolve default branch"))?,
        };

        let id = generate_uuid();
        let name = request.name.trim().to_string();
        let working_dir = self
            .options
            .workspace_dir
            .join(format!("{}-{}", id, slugify(&name)));

        info!("Creating workload {} from {} ({})", name, repository_url, branch);

        if let Err(e) = self
            .git
            .clone_repository(&repository_url, &branch, auth.as_ref(), &working_dir)
            .await
        {
            self.discard_working_dir(&working_dir).await;
            return Err(e.context("Failed to clone repository"));
        }

        let result = async {
            let last_commit = self.git.latest_commit(&working_dir).await.ok();
            let credentials = auth
                .as_ref()
                .map(|a| self.codec.encrypt(a))
                .transpose()?;
            let status = WorkloadStatus::Unknown
                .next(&WorkloadEvent::Created)
                .map_err(DockhandError::Internal)?;

            let now = Utc::now();
            let workload = Workload {
                id: id.clone(),
                name: name.clone(),
                repository_url: repository_url.clone(),
                branch: branch.clone(),
                credentials,
                working_dir: working_dir.clone(),
                compose_files: request.compose_files.iter().map(|f| f.trim().to_string()).collect(),
                environment: request.environment.clone(),
                status,
                last_commit,
                auto_deploy: request.auto_deploy,
                created_at: now,
                updated_at: now,
            };
            self.store.create_workload(&workload).await?;
            Ok::<_, DockhandError>(workload)
        }
        .await;

        match result {
            Ok(workload) => {
                info!("Created workload {} ({})", workload.name, workload.id);
                Ok(workload)
            }
            Err(e) => {
                self.discard_working_dir(&working_dir).await;
                Err(e)
            }
        }
    }

    /// Change settings of a workload. The working directory stays where it is.
    pub async fn update(&self, id: &str, request: UpdateWorkload) -> Result<Workload, DockhandError> {
        request.validate()?;
        let _guard = self.locks.acquire(id).await;

        let mut workload = self.store.find_workload(id).await?;

        if let Some(name) = request.name {
            workload.name = name.trim().to_string();
        }
        if let Some(branch) = request.branch {
            workload.branch = branch.trim().to_string();
        }
        if let Some(auth) = request.auth {
            workload.credentials = if auth.is_empty() {
                None
            } else {
                Some(self.codec.encrypt(&auth)?)
            };
        }
        if let Some(compose_files) = request.compose_files {
            workload.compose_files = compose_files.iter().map(|f| f.trim().to_string()).collect();
        }
        if let Some(environment) = request.environment {
            workload.environment = environment;
        }
        if let Some(auto_deploy) = request.auto_deploy {
            workload.auto_deploy = auto_deploy;
        }
        workload.updated_at = Utc::now();

        self.store.update_workload(&workload).await?;
        info!("Updated workload {} ({})", workload.name, workload.id);
        Ok(workload)
    }

    /// Stop the stack, retire the working directory and forget the workload
    pub async fn remove(&self, id: &str) -> Result<(), DockhandError> {
        let _guard = self.locks.acquire(id).await;

        let workload = self.store.find_workload(id).await?;
        self.stop_locked(&workload, &Observer::None)
            .await
            .map_err(|e| e.context("Failed to remove workload"))?;

        let dir = Dir::new(&workload.working_dir);
        if dir.exists().await {
            match dir.retire().await {
                Ok(retired) => info!(
                    "Moved {} to {}",
                    workload.working_dir.display(),
                    retired.path().display()
                ),
                Err(e) => error!(
                    "Failed to retire working directory {}: {}",
                    workload.working_dir.display(),
                    e
                ),
            }
        }

        self.store.delete_deployments(&workload.id).await?;
        self.store.delete_workload(&workload.id).await?;
        info!("Removed workload {} ({})", workload.name, workload.id);
        Ok(())
    }

    // ====================================== DEPLOY ====================================== //

    /// Deploy with progress sent to `tx`; the channel closes after the
    /// terminal message.
    pub async fn deploy_streaming(
        &self,
        id: &str,
        pull: bool,
        tx: mpsc::Sender<StreamMessage>,
    ) -> Result<Deployment, DockhandError> {
        self.deploy(id, pull, Observer::Channel(tx)).await
    }

    /// Deploy with progress printed to stdout
    pub async fn deploy_piping(&self, id: &str, pull: bool) -> Result<Deployment, DockhandError> {
        self.deploy(id, pull, Observer::Stdout).await
    }

    /// Pull (optionally), create, prepare volumes and start. Always ends with
    /// exactly one terminal message to `observer`.
    pub async fn deploy(
        &self,
        id: &str,
        pull: bool,
        observer: Observer,
    ) -> Result<Deployment, DockhandError> {
        let result = {
            let _guard = self.locks.acquire(id).await;
            self.deploy_locked(id, pull, &observer).await
        };

        match &result {
            Ok(deployment) => {
                observer
                    .conclude(StreamMessage::success(format!(
                        "Deployment {} completed",
                        deployment.id
                    )))
                    .await
            }
            Err(e) => observer.conclude(StreamMessage::error(e.to_string())).await,
        }
        result
    }

    async fn deploy_locked(
        &self,
        id: &str,
        pull: bool,
        observer: &Observer,
    ) -> Result<Deployment, DockhandError> {
        let mut workload = self.store.find_workload(id).await?;
        let project = ComposeProject::for_workload(&workload);

        let current = self.git.latest_commit(&workload.working_dir).await.ok();
        let mut deployment = Deployment::started(&workload.id, current.clone());
        self.store.create_deployment(&deployment).await?;
        info!(
            "Deployment {} of {} started at {}",
            deployment.id,
            workload.name,
            current.as_deref().unwrap_or("unknown commit")
        );

        let capture = Capture::default();
        let mut sinks = vec![capture.sink()];
        sinks.extend(observer.sink());
        let relay = Relay::start(sinks);

        let outcome = self
            .run_deploy_phases(&workload, &project, pull, current, &relay)
            .await;

        // everything the runtime produced must be captured before the record is written
        if let Err(e) = relay.finish().await {
            warn!("{}", e);
        }
        let output = capture.take();

        match outcome {
            Ok(commit) => {
                deployment
                    .finish(DeploymentEvent::Complete, output.stdout, output.stderr)?;
                self.store.update_deployment(&deployment).await?;

                workload.status = workload
                    .status
                    .next(&WorkloadEvent::DeploySucceeded)
                    .map_err(DockhandError::Internal)?;
                if commit.is_some() {
                    workload.last_commit = commit;
                }
                workload.updated_at = Utc::now();
                self.store.update_workload(&workload).await?;

                info!("Deployment {} of {} completed", deployment.id, workload.name);
                Ok(deployment)
            }
            Err(e) => {
                error!("Deployment {} of {} failed: {}", deployment.id, workload.name, e);

                if let Err(record_err) = deployment.finish(
                    DeploymentEvent::Fail(e.to_string()),
                    output.stdout,
                    output.stderr,
                ) {
                    error!("{}", record_err);
                } else if let Err(record_err) = self.store.update_deployment(&deployment).await {
                    error!("Failed to record deployment failure: {}", record_err);
                }

                match workload.status.next(&WorkloadEvent::DeployFailed) {
                    Ok(status) => {
                        workload.status = status;
                        workload.updated_at = Utc::now();
                        if let Err(record_err) = self.store.update_workload(&workload).await {
                            error!("Failed to record workload error: {}", record_err);
                        }
                    }
                    Err(transition) => error!("{}", transition),
                }
                Err(e)
            }
        }
    }

    /// Returns the commit that ended up deployed
    async fn run_deploy_phases(
        &self,
        workload: &Workload,
        project: &ComposeProject,
        pull: bool,
        current: Option<String>,
        relay: &Relay,
    ) -> Result<Option<String>, DockhandError> {
        let dir = &workload.working_dir;
        let mut commit = current;

        if pull {
            let auth = self.auth_for(workload)?;
            relay
                .send(StreamMessage::info(format!("Pulling {}", workload.branch)))
                .await;
            self.git
                .pull(&workload.branch, auth.as_ref(), dir)
                .await
                .map_err(|e| e.context("Failed to pull repository"))?;

            let after = self.git.latest_commit(dir).await?;
            relay
                .send(StreamMessage::info(describe_pull(commit.as_deref(), &after)))
                .await;
            commit = Some(after);
        }

        relay.send(StreamMessage::info("Creating containers")).await;
        self.runtime
            .create(project, ExecMode::Streamed(relay.sender()))
            .await
            .map_err(|e| e.context("Failed to create containers"))?;

        relay.send(StreamMessage::info("Preparing volume mounts")).await;
        self.runtime
            .initialize_volume_mounts(project, ExecMode::Streamed(relay.sender()))
            .await
            .map_err(|e| e.context("Failed to prepare volume mounts"))?;

        relay.send(StreamMessage::info("Starting containers")).await;
        self.runtime
            .start(project, ExecMode::Streamed(relay.sender()))
            .await
            .map_err(|e| e.context("Failed to start containers"))?;

        Ok(commit)
    }

    /// Fetch and deploy when the remote branch moved past `last_commit`.
    /// Returns the deployment if one ran.
    pub async fn check_for_update(&self, id: &str) -> Result<Option<Deployment>, DockhandError> {
        // released before deploying, which takes the lock itself
        let (workload, remote) = {
            let _guard = self.locks.acquire(id).await;
            let workload = self.store.find_workload(id).await?;
            let auth = self.auth_for(&workload)?;

            self.git
                .fetch(&workload.branch, auth.as_ref(), &workload.working_dir)
                .await
                .map_err(|e| e.context("Failed to fetch repository"))?;
            let remote = self
                .git
                .remote_latest_commit(&workload.working_dir, &workload.branch)
                .await?;
            (workload, remote)
        };

        if workload.last_commit.as_deref() == Some(remote.as_str()) {
            return Ok(None);
        }

        info!(
            "{} moved to {}, redeploying {}",
            workload.branch,
            short_hash(&remote),
            workload.name
        );
        self.deploy(id, true, Observer::None).await.map(Some)
    }

    // ======================================= STOP ======================================= //

    pub async fn stop_streaming(
        &self,
        id: &str,
        tx: mpsc::Sender<StreamMessage>,
    ) -> Result<(), DockhandError> {
        self.stop(id, Observer::Channel(tx)).await
    }

    pub async fn stop_piping(&self, id: &str) -> Result<(), DockhandError> {
        self.stop(id, Observer::Stdout).await
    }

    /// Stop and remove the containers, keeping volumes
    pub async fn stop(&self, id: &str, observer: Observer) -> Result<(), DockhandError> {
        let result = {
            let _guard = self.locks.acquire(id).await;
            match self.store.find_workload(id).await {
                Ok(workload) => self.stop_locked(&workload, &observer).await,
                Err(e) => Err(e),
            }
        };

        match &result {
            Ok(()) => {
                observer
                    .conclude(StreamMessage::success("Workload stopped"))
                    .await
            }
            Err(e) => observer.conclude(StreamMessage::error(e.to_string())).await,
        }
        result
    }

    /// On failure the workload status is left as it was
    async fn stop_locked(
        &self,
        workload: &Workload,
        observer: &Observer,
    ) -> Result<(), DockhandError> {
        let project = ComposeProject::for_workload(workload);
        let relay = Relay::start(observer.sink().into_iter().collect());

        let outcome = self
            .runtime
            .down(&project, false, ExecMode::Streamed(relay.sender()))
            .await;
        if let Err(e) = relay.finish().await {
            warn!("{}", e);
        }
        outcome.map_err(|e| e.context(format!("Failed to stop {}", workload.name)))?;

        let mut workload = workload.clone();
        workload.status = workload
            .status
            .next(&WorkloadEvent::Stopped)
            .map_err(DockhandError::Internal)?;
        workload.updated_at = Utc::now();
        self.store.update_workload(&workload).await?;

        info!("Stopped workload {} ({})", workload.name, workload.id);
        Ok(())
    }

    // ==================================== INSPECTION ==================================== //

    pub async fn logs(
        &self,
        id: &str,
        options: &LogsOptions,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        let workload = self.store.find_workload(id).await?;
        self.runtime
            .logs(&ComposeProject::for_workload(&workload), options, mode)
            .await
    }

    pub async fn config(&self, id: &str) -> Result<serde_json::Value, DockhandError> {
        let workload = self.store.find_workload(id).await?;
        self.runtime
            .config(&ComposeProject::for_workload(&workload))
            .await
    }

    pub async fn status(&self, id: &str) -> Result<StackStatus, DockhandError> {
        let workload = self.store.find_workload(id).await?;
        self.monitor
            .status(&ComposeProject::for_workload(&workload))
            .await
    }
}
