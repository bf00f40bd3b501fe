//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DockhandError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DockhandError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DockhandError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Rename the directory to a `deleted-<name>` sibling and return the new
    /// location. A timestamp suffix is appended when that sibling is taken.
    pub async fn retire(&self) -> Result<Dir, DockhandError> {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                DockhandError::ValidationError(format!(
                    "Directory has no name: {}",
                    self.path.display()
                ))
            })?;
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));

        let mut target = Dir::new(parent.join(format!("deleted-{}", name)));
        if fs::symlink_metadata(target.path()).await.is_ok() {
            let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
            target = Dir::new(parent.join(format!("deleted-{}-{}", name, stamp)));
        }

        fs::rename(&self.path, target.path()).await?;
        Ok(target)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
