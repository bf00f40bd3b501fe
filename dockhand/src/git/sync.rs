//! libgit2-backed [`GitSync`] implementation.
//!
//! Every operation runs on the blocking pool under a deadline. The transfer
//! progress callback stops long fetches once the deadline passes so the
//! blocking thread does not outlive the timeout by much.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Direction, ErrorCode, FetchOptions, Remote, Repository, ResetType};
use tracing::{debug, info, warn};

use crate::credentials::AuthDescriptor;
use crate::errors::DockhandError;
use crate::git::auth::{remote_callbacks, resolve_auth};
use crate::git::GitSync;

const REMOTE_NAME: &str = "origin";

/// Git engine options
#[derive(Debug, Clone)]
pub struct GitOptions {
    /// Deadline applied to every operation
    pub timeout: Duration,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// Git engine on top of libgit2
#[derive(Debug, Clone, Default)]
pub struct GitSyncEngine {
    options: GitOptions,
}

impl GitSyncEngine {
    pub fn new(options: GitOptions) -> Self {
        Self { options }
    }

    async fn run_blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T, DockhandError>
    where
        T: Send + 'static,
        F: FnOnce(Instant) -> Result<T, DockhandError> + Send + 'static,
    {
        let timeout = self.options.timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = || {
            DockhandError::GitError(format!(
                "git {} timed out after {}s",
                operation,
                timeout.as_secs()
            ))
        };

        let handle = tokio::task::spawn_blocking(move || f(deadline));
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(_))) if Instant::now() >= deadline => Err(timed_out()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(DockhandError::Internal(format!(
                "git {} task failed: {}",
                operation, e
            ))),
            Err(_) => Err(timed_out()),
        }
    }
}

fn branch_refspec(branch: &str) -> String {
    format!(
        "+refs/heads/{b}:refs/remotes/{r}/{b}",
        b = branch,
        r = REMOTE_NAME
    )
}

fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", REMOTE_NAME, branch)
}

fn fetch_options(
    auth: Option<&AuthDescriptor>,
    deadline: Instant,
) -> Result<FetchOptions<'static>, DockhandError> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(resolve_auth(auth)?, deadline));
    Ok(options)
}

fn open(dir: &Path) -> Result<Repository, DockhandError> {
    Repository::open(dir).map_err(|e| {
        DockhandError::GitError(format!(
            "Failed to open repository at {}: {}",
            dir.display(),
            e.message()
        ))
    })
}

fn clone_blocking(
    url: &str,
    branch: &str,
    auth: Option<&AuthDescriptor>,
    dir: &Path,
    deadline: Instant,
) -> Result<(), DockhandError> {
    let refspec = branch_refspec(branch);

    let mut builder = RepoBuilder::new();
    builder
        .branch(branch)
        .fetch_options(fetch_options(auth, deadline)?)
        .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));

    builder.clone(url, dir).map_err(|e| {
        DockhandError::GitError(format!(
            "Failed to clone {} ({}): {}",
            url,
            branch,
            e.message()
        ))
    })?;
    Ok(())
}

fn fetch_blocking(
    repo: &Repository,
    branch: &str,
    auth: Option<&AuthDescriptor>,
    deadline: Instant,
) -> Result<(), DockhandError> {
    let mut remote = repo.find_remote(REMOTE_NAME)?;
    let mut options = fetch_options(auth, deadline)?;
    remote
        .fetch(&[branch_refspec(branch)], Some(&mut options), None)
        .map_err(|e| {
            DockhandError::GitError(format!("Failed to fetch {}: {}", branch, e.message()))
        })?;
    Ok(())
}

fn head_oid(repo: &Repository) -> Option<git2::Oid> {
    repo.head().ok().and_then(|head| head.target())
}

fn pull_blocking(
    repo: &Repository,
    branch: &str,
    auth: Option<&AuthDescriptor>,
    deadline: Instant,
) -> Result<(), DockhandError> {
    fetch_blocking(repo, branch, auth, deadline)?;

    let target_oid = repo.refname_to_id(&remote_ref(branch)).map_err(|e| {
        DockhandError::GitError(format!(
            "Remote branch {} not found after fetch: {}",
            branch,
            e.message()
        ))
    })?;

    if head_oid(repo) == Some(target_oid) {
        debug!("Repository already at {}", target_oid);
        return Ok(());
    }

    let target = repo.find_commit(target_oid)?;

    // Step 1: move the working tree and the local branch. Untracked files stay.
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(target.as_object(), Some(&mut checkout))
        .map_err(|e| DockhandError::GitError(format!("Failed to checkout: {}", e.message())))?;

    let local_ref = format!("refs/heads/{}", branch);
    repo.reference(
        &local_ref,
        target_oid,
        true,
        &format!("dockhand: pull {}", target_oid),
    )?;
    repo.set_head(&local_ref)?;

    // Step 2: make the index and tracked files match the target exactly
    repo.reset(target.as_object(), ResetType::Mixed, None)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;

    info!("Pulled {} to {}", branch, target_oid);
    Ok(())
}

/// A reference as advertised by a remote
#[derive(Debug, Clone)]
pub struct AdvertisedRef {
    pub name: String,
    pub oid: String,
    pub symref_target: Option<String>,
}

/// Pick the default branch out of an advertisement
pub fn pick_default_branch(refs: &[AdvertisedRef]) -> Option<String> {
    let head = refs.iter().find(|r| r.name == "HEAD")?;

    if let Some(branch) = head
        .symref_target
        .as_deref()
        .and_then(|t| t.strip_prefix("refs/heads/"))
    {
        return Some(branch.to_string());
    }

    refs.iter()
        .filter(|r| r.oid == head.oid)
        .find_map(|r| r.name.strip_prefix("refs/heads/"))
        .map(str::to_string)
}

fn list_remote_refs(
    url: &str,
    auth: Option<&AuthDescriptor>,
    deadline: Instant,
) -> Result<Vec<AdvertisedRef>, DockhandError> {
    let mut remote = Remote::create_detached(url)?;
    let callbacks = remote_callbacks(resolve_auth(auth)?, deadline);
    let connection = remote
        .connect_auth(Direction::Fetch, Some(callbacks), None)
        .map_err(|e| {
            DockhandError::GitError(format!("Failed to connect to {}: {}", url, e.message()))
        })?;

    let refs = connection
        .list()?
        .iter()
        .map(|head| AdvertisedRef {
            name: head.name().to_string(),
            oid: head.oid().to_string(),
            symref_target: head.symref_target().map(str::to_string),
        })
        .collect();
    Ok(refs)
}

#[async_trait]
impl GitSync for GitSyncEngine {
    async fn clone_repository(
        &self,
        url: &str,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError> {
        let branch = if branch.trim().is_empty() {
            self.default_branch(url, auth).await?
        } else {
            branch.to_string()
        };

        info!("Cloning {} ({}) into {}", url, branch, dir.display());
        let existed = dir.exists();
        let (url_owned, auth_owned, dir_owned) =
            (url.to_string(), auth.cloned(), dir.to_path_buf());

        let result = self
            .run_blocking("clone", move |deadline| {
                clone_blocking(&url_owned, &branch, auth_owned.as_ref(), &dir_owned, deadline)
            })
            .await;

        if result.is_err() && !existed && dir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                warn!("Failed to remove partial clone {}: {}", dir.display(), e);
            }
        }
        result
    }

    async fn fetch(
        &self,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError> {
        let (branch, auth, dir) = (branch.to_string(), auth.cloned(), dir.to_path_buf());
        self.run_blocking("fetch", move |deadline| {
            fetch_blocking(&open(&dir)?, &branch, auth.as_ref(), deadline)
        })
        .await
    }

    async fn pull(
        &self,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError> {
        let (branch, auth, dir) = (branch.to_string(), auth.cloned(), dir.to_path_buf());
        self.run_blocking("pull", move |deadline| {
            pull_blocking(&open(&dir)?, &branch, auth.as_ref(), deadline)
        })
        .await
    }

    async fn latest_commit(&self, dir: &Path) -> Result<String, DockhandError> {
        let dir: PathBuf = dir.to_path_buf();
        self.run_blocking("rev-parse", move |_| {
            let repo = open(&dir)?;
            let commit = repo.head()?.peel_to_commit()?;
            Ok(commit.id().to_string())
        })
        .await
    }

    async fn remote_latest_commit(
        &self,
        dir: &Path,
        branch: &str,
    ) -> Result<String, DockhandError> {
        let (dir, branch) = (dir.to_path_buf(), branch.to_string());
        self.run_blocking("rev-parse", move |_| {
            let repo = open(&dir)?;
            match repo.refname_to_id(&remote_ref(&branch)) {
                Ok(oid) => Ok(oid.to_string()),
                Err(e) if e.code() == ErrorCode::NotFound => Err(DockhandError::NotFound(
                    format!("remote branch {} has not been fetched", branch),
                )),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn default_branch(
        &self,
        url: &str,
        auth: Option<&AuthDescriptor>,
    ) -> Result<String, DockhandError> {
        let (url, auth) = (url.to_string(), auth.cloned());
        self.run_blocking("ls-remote", move |deadline| {
            let refs = list_remote_refs(&url, auth.as_ref(), deadline)?;
            pick_default_branch(&refs).ok_or_else(|| {
                DockhandError::NotFound(format!("no default branch advertised by {}", url))
            })
        })
        .await
    }

    async fn test_authentication(
        &self,
        url: &str,
        auth: Option<&AuthDescriptor>,
    ) -> Result<(), DockhandError> {
        let (url, auth) = (url.to_string(), auth.cloned());
        self.run_blocking("ls-remote", move |deadline| {
            list_remote_refs(&url, auth.as_ref(), deadline).map(|_| ())
        })
        .await
    }
}
