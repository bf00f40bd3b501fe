//! Workload models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::{AuthDescriptor, SealedCredentials};
use crate::errors::DockhandError;

/// A deployable unit: a Git repository plus the Compose files inside it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    /// Unique workload ID
    pub id: String,

    /// Human readable name
    pub name: String,

    /// Repository URL (https or scp-like ssh)
    pub repository_url: String,

    /// Tracked branch, never empty once created
    pub branch: String,

    /// Encrypted authentication descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<SealedCredentials>,

    /// Clone location, fixed at creation
    pub working_dir: PathBuf,

    /// Compose files relative to the working directory, in merge order
    pub compose_files: Vec<String>,

    /// `KEY=VALUE` assignments passed to the runtime
    #[serde(default)]
    pub environment: Vec<String>,

    /// Current status
    pub status: WorkloadStatus,

    /// Commit of the last successful deployment
    pub last_commit: Option<String>,

    /// Redeploy automatically when the remote branch moves
    #[serde(default)]
    pub auto_deploy: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workload {
    /// Compose project name, derived from the working directory name
    pub fn project_name(&self) -> String {
        self.working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Workload status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    #[default]
    Unknown,
    Running,
    Stopped,
    Error,
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadStatus::Unknown => "unknown",
            WorkloadStatus::Running => "running",
            WorkloadStatus::Stopped => "stopped",
            WorkloadStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create a workload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateWorkload {
    pub name: String,
    pub repository_url: String,

    /// Empty means the repository default branch
    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub auth: Option<AuthDescriptor>,

    pub compose_files: Vec<String>,

    #[serde(default)]
    pub environment: Vec<String>,

    #[serde(default)]
    pub auto_deploy: bool,
}

impl CreateWorkload {
    /// Check required fields
    pub fn validate(&self) -> Result<(), DockhandError> {
        validate_name(&self.name)?;
        validate_repository_url(&self.repository_url)?;
        validate_compose_files(&self.compose_files)?;
        validate_environment(&self.environment)?;
        Ok(())
    }
}

/// Partial update of a workload; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateWorkload {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub branch: Option<String>,

    /// An empty descriptor clears stored credentials
    #[serde(default)]
    pub auth: Option<AuthDescriptor>,

    #[serde(default)]
    pub compose_files: Option<Vec<String>>,

    #[serde(default)]
    pub environment: Option<Vec<String>>,

    #[serde(default)]
    pub auto_deploy: Option<bool>,
}

impl UpdateWorkload {
    pub fn validate(&self) -> Result<(), DockhandError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(branch) = &self.branch {
            if branch.trim().is_empty() {
                return Err(DockhandError::ValidationError(
                    "branch cannot be empty".to_string(),
                ));
            }
        }
        if let Some(files) = &self.compose_files {
            validate_compose_files(files)?;
        }
        if let Some(environment) = &self.environment {
            validate_environment(environment)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), DockhandError> {
    if name.trim().is_empty() {
        return Err(DockhandError::ValidationError("name is required".to_string()));
    }
    Ok(())
}

fn validate_repository_url(repository_url: &str) -> Result<(), DockhandError> {
    let repository_url = repository_url.trim();
    if repository_url.is_empty() {
        return Err(DockhandError::ValidationError(
            "repository_url is required".to_string(),
        ));
    }

    if url::Url::parse(repository_url).is_ok() || is_scp_like(repository_url) {
        return Ok(());
    }

    Err(DockhandError::ValidationError(format!(
        "repository_url is not a valid URL: {}",
        repository_url
    )))
}

/// `user@host:path` as accepted by ssh-based git remotes
fn is_scp_like(value: &str) -> bool {
    match value.split_once(':') {
        Some((authority, path)) => {
            !path.is_empty()
                && !path.starts_with("//")
                && authority
                    .rsplit('@')
                    .next()
                    .map(|host| !host.is_empty() && !host.contains('/'))
                    .unwrap_or(false)
        }
        None => false,
    }
}

fn validate_compose_files(files: &[String]) -> Result<(), DockhandError> {
    if files.is_empty() {
        return Err(DockhandError::ValidationError(
            "at least one compose file is required".to_string(),
        ));
    }
    for file in files {
        let trimmed = file.trim();
        if trimmed.is_empty() {
            return Err(DockhandError::ValidationError(
                "compose file path cannot be empty".to_string(),
            ));
        }
        if std::path::Path::new(trimmed).is_absolute() || trimmed.split('/').any(|p| p == "..") {
            return Err(DockhandError::ValidationError(format!(
                "compose file must be relative to the repository: {}",
                trimmed
            )));
        }
    }
    Ok(())
}

fn validate_environment(environment: &[String]) -> Result<(), DockhandError> {
    for assignment in environment {
        match assignment.split_once('=') {
            Some((key, _)) if !key.trim().is_empty() => {}
            _ => {
                return Err(DockhandError::ValidationError(format!(
                    "environment entry must be KEY=VALUE: {}",
                    assignment
                )))
            }
        }
    }
    Ok(())
}
