//! Git synchronization of workload repositories

pub mod auth;
pub mod sync;

use std::path::Path;

use async_trait::async_trait;

use crate::credentials::AuthDescriptor;
use crate::errors::DockhandError;

pub use auth::{resolve_auth, ResolvedAuth};
pub use sync::GitSyncEngine;

/// Repository operations used by the deployment coordinator
#[async_trait]
pub trait GitSync: Send + Sync {
    /// Single-branch clone of `url` into `dir`
    async fn clone_repository(
        &self,
        url: &str,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError>;

    /// Update `refs/remotes/origin/<branch>` from the remote
    async fn fetch(
        &self,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError>;

    /// Fetch and move the working tree to the remote branch head
    async fn pull(
        &self,
        branch: &str,
        auth: Option<&AuthDescriptor>,
        dir: &Path,
    ) -> Result<(), DockhandError>;

    /// Hash of the checked out commit
    async fn latest_commit(&self, dir: &Path) -> Result<String, DockhandError>;

    /// Hash of the last fetched remote branch head
    async fn remote_latest_commit(&self, dir: &Path, branch: &str)
        -> Result<String, DockhandError>;

    /// Branch the remote `HEAD` points at
    async fn default_branch(
        &self,
        url: &str,
        auth: Option<&AuthDescriptor>,
    ) -> Result<String, DockhandError>;

    /// List remote references to check the credentials
    async fn test_authentication(
        &self,
        url: &str,
        auth: Option<&AuthDescriptor>,
    ) -> Result<(), DockhandError>;
}
