//! On-disk layout of the dockhand home directory

use std::path::PathBuf;

use crate::errors::DockhandError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "DOCKHAND_HOME";

/// Paths derived from the base directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// `$DOCKHAND_HOME`, else `~/.dockhand`
    pub fn from_env() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(home);
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".dockhand"))
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Persisted workloads and deployments
    pub fn state_file(&self) -> File {
        File::new(self.base_dir.join("state.json"))
    }

    /// age identity used for credentials at rest
    pub fn key_file(&self) -> File {
        File::new(self.base_dir.join("key.txt"))
    }

    /// Default parent of workload working directories
    pub fn workspace_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("workspace"))
    }

    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Create the base directory tree
    pub async fn setup(&self) -> Result<(), DockhandError> {
        Dir::new(&self.base_dir).create().await?;
        self.workspace_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::from_env()
    }
}
