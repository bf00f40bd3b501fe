//! In-process stand-ins for git and the container runtime

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use dockhand::app::context::AppContext;
use dockhand::compose::{
    CommandOutput, ComposeProject, ComposeRuntime, ExecMode, LogsOptions, StackStatus,
};
use dockhand::credentials::{AgeCodec, AuthDescriptor, CredentialCodec};
use dockhand::errors::DockhandError;
use dockhand::git::GitSync;
use dockhand::models::deployment::DeploymentStatus;
use dockhand::models::stream::StreamMessage;
use dockhand::storage::layout::StorageLayout;
use dockhand::storage::settings::Settings;
use dockhand::storage::{MemoryStore, WorkloadStore};

pub const FIRST_COMMIT: &str = "1111111111111111111111111111111111111111";
pub const SECOND_COMMIT: &str = "2222222222222222222222222222222222222222";

// ================================== RECORDS ===================================== //

/// Snapshots the deployment records in the store each time a fake is called
#[derive(Default)]
pub struct RecordWatcher {
    store: OnceLock<Arc<dyn WorkloadStore>>,
    seen: Mutex<Vec<(String, Vec<DeploymentStatus>)>>,
}

impl RecordWatcher {
    fn attach(&self, store: Arc<dyn WorkloadStore>) {
        let _ = self.store.set(store);
    }

    async fn snapshot(&self, call: &str) {
        let Some(store) = self.store.get() else {
            return;
        };
        let mut statuses = vec![];
        for workload in store.list_workloads().await.unwrap() {
            for deployment in store.list_deployments(&workload.id).await.unwrap() {
                statuses.push(deployment.status);
            }
        }
        self.seen.lock().unwrap().push((call.to_string(), statuses));
    }

    /// Deployment statuses seen at each call, in call order
    pub fn seen(&self) -> Vec<(String, Vec<DeploymentStatus>)> {
        self.seen.lock().unwrap().clone()
    }
}

// ==================================== GIT ======================================= //

#[derive(Debug, Default)]
struct GitState {
    local_head: Option<String>,
    remote_head: String,
    fail_clone: bool,
    fail_pull: bool,
    clones: Vec<(String, String)>,
    pulls: usize,
}

/// Pretends every clone checks out `remote_head`
pub struct FakeGit {
    state: Mutex<GitState>,
    records: Arc<RecordWatcher>,
    pull_delay: Mutex<Option<Duration>>,
    pulling: AtomicBool,
    overlapping_fetches: AtomicUsize,
}

impl FakeGit {
    pub fn new(records: Arc<RecordWatcher>) -> Self {
        Self {
            state: Mutex::new(GitState {
                remote_head: FIRST_COMMIT.to_string(),
                ..Default::default()
            }),
            records,
            pull_delay: Mutex::new(None),
            pulling: AtomicBool::new(false),
            overlapping_fetches: AtomicUsize::new(0),
        }
    }

    /// Make every pull hold the repository for `delay`
    pub fn slow_pull(&self, delay: Duration) {
        *self.pull_delay.lock().unwrap() = Some(delay);
    }

    pub fn is_pulling(&self) -> bool {
        self.pulling.load(Ordering::SeqCst)
    }

    /// Fetches that ran while a pull was in progress
    pub fn overlapping_fetches(&self) -> usize {
        self.overlapping_fetches.load(Ordering::SeqCst)
    }

    fn with<T>(&self, f: impl FnOnce(&mut GitState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn push(&self, commit: &str) {
        self.with(|s| s.remote_head = commit.to_string());
    }

    pub fn fail_clone(&self) {
        self.with(|s| s.fail_clone = true);
    }

    pub fn fail_pull(&self) {
        self.with(|s| s.fail_pull = true);
    }

    pub fn clones(&self) -> Vec<(String, String)> {
        self.with(|s| s.clones.clone())
    }

    pub fn pulls(&self) -> usize {
        self.with(|s| s.pulls)
    }
}

#[async_trait]
impl GitSync for FakeGit {
    async fn clone_repository(
        &self,
        url: &str,
        branch: &str,
        _auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError> {
        std::fs::create_dir_all(dir)?;
        if self.with(|s| s.fail_clone) {
            return Err(DockhandError::GitError(
                "remote authentication required but no callback set".to_string(),
            ));
        }
        std::fs::write(dir.join("docker-compose.yml"), "services: {}\n")?;
        self.with(|s| {
            s.clones.push((url.to_string(), branch.to_string()));
            s.local_head = Some(s.remote_head.clone());
        });
        Ok(())
    }

    async fn fetch(
        &self,
        _branch: &str,
        _auth: Option<&AuthDescriptor>,
        _dir: &Path,
    ) -> Result<(), DockhandError> {
        if self.is_pulling() {
            self.overlapping_fetches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn pull(
        &self,
        _branch: &str,
        _auth: Option<&AuthDescriptor>,
        _dir: &Path,
    ) -> Result<(), DockhandError> {
        self.records.snapshot("pull").await;
        let delay = *self.pull_delay.lock().unwrap();
        if let Some(delay) = delay {
            self.pulling.store(true, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.pulling.store(false, Ordering::SeqCst);
        }
        self.with(|s| {
            s.pulls += 1;
            if s.fail_pull {
                return Err(DockhandError::GitError("could not read from remote".to_string()));
            }
            s.local_head = Some(s.remote_head.clone());
            Ok(())
        })
    }

    async fn latest_commit(&self, _dir: &Path) -> Result<String, DockhandError> {
        self.with(|s| s.local_head.clone())
            .ok_or_else(|| DockhandError::GitError("no HEAD".to_string()))
    }

    async fn remote_latest_commit(
        &self,
        _dir: &Path,
        _branch: &str,
    ) -> Result<String, DockhandError> {
        Ok(self.with(|s| s.remote_head.clone()))
    }

    async fn default_branch(
        &self,
        _url: &str,
        _auth: Option<&AuthDescriptor>,
    ) -> Result<String, DockhandError> {
        Ok("main".to_string())
    }

    async fn test_authentication(
        &self,
        _url: &str,
        _auth: Option<&AuthDescriptor>,
    ) -> Result<(), DockhandError> {
        Ok(())
    }
}

// ================================== RUNTIME ===================================== //

/// Records calls and streams one line per lifecycle step
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<&'static str>>,
    records: Arc<RecordWatcher>,
}

impl FakeRuntime {
    pub fn new(records: Arc<RecordWatcher>) -> Self {
        Self {
            calls: Mutex::new(vec![]),
            fail_on: Mutex::new(None),
            records,
        }
    }

    pub fn fail_on(&self, step: &'static str) {
        *self.fail_on.lock().unwrap() = Some(step);
    }

    pub fn succeed(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn step(
        &self,
        name: &'static str,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        self.records.snapshot(name).await;
        self.calls.lock().unwrap().push(name.to_string());
        let failing = *self.fail_on.lock().unwrap() == Some(name);

        let stdout = format!("{} {}", name, project.project_name);
        if let ExecMode::Streamed(tx) = &mode {
            let _ = tx.send(StreamMessage::stdout(stdout.clone())).await;
            if failing {
                let _ = tx.send(StreamMessage::stderr(format!("{} failed", name))).await;
            }
        }

        if failing {
            return Err(DockhandError::RuntimeError(format!(
                "compose {} exited with status 1",
                name
            )));
        }
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl ComposeRuntime for FakeRuntime {
    async fn create(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        self.step("create", project, mode).await
    }

    async fn initialize_volume_mounts(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<(), DockhandError> {
        self.step("volumes", project, mode).await.map(|_| ())
    }

    async fn start(
        &self,
        project: &ComposeProject,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        self.step("start", project, mode).await
    }

    async fn down(
        &self,
        project: &ComposeProject,
        _remove_volumes: bool,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        self.step("down", project, mode).await
    }

    async fn logs(
        &self,
        project: &ComposeProject,
        _options: &LogsOptions,
        mode: ExecMode,
    ) -> Result<CommandOutput, DockhandError> {
        self.step("logs", project, mode).await
    }

    async fn config(&self, project: &ComposeProject) -> Result<serde_json::Value, DockhandError> {
        self.calls.lock().unwrap().push("config".to_string());
        Ok(serde_json::json!({ "name": project.project_name, "services": {} }))
    }

    async fn status(&self, _project: &ComposeProject) -> Result<StackStatus, DockhandError> {
        self.calls.lock().unwrap().push("status".to_string());
        Ok(StackStatus::aggregate(vec![]))
    }
}

// ================================== HARNESS ===================================== //

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub git: Arc<FakeGit>,
    pub runtime: Arc<FakeRuntime>,
    pub store: Arc<dyn WorkloadStore>,
    pub records: Arc<RecordWatcher>,
    pub context: AppContext,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        let records = Arc::new(RecordWatcher::default());
        let git = Arc::new(FakeGit::new(records.clone()));
        let runtime = Arc::new(FakeRuntime::new(records.clone()));
        let store: Arc<dyn WorkloadStore> = Arc::new(MemoryStore::new());
        records.attach(store.clone());
        let codec: Arc<dyn CredentialCodec> =
            Arc::new(AgeCodec::new(age::x25519::Identity::generate()));

        let context = AppContext::from_parts(
            layout,
            Settings::default(),
            store.clone(),
            git.clone(),
            runtime.clone(),
            codec,
        );

        Self {
            dir,
            git,
            runtime,
            store,
            records,
            context,
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("workspace")
    }
}
