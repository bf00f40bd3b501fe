//! Bind mount preparation.
//!
//! The runtime creates missing bind mount sources as root-owned directories.
//! Services running as an unprivileged numeric user then cannot write to them,
//! so sources inside the working directory are created ahead of `start` and
//! handed to the service user.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::DockhandError;

/// A bind mount source that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMount {
    pub service: String,
    pub source: PathBuf,

    /// `(uid, gid)` from the service `user`, when numeric
    pub owner: Option<(u32, Option<u32>)>,
}

/// `1000` or `1000:1000`; names are not resolved
pub fn parse_numeric_user(user: &str) -> Option<(u32, Option<u32>)> {
    match user.trim().split_once(':') {
        Some((uid, gid)) => Some((uid.parse().ok()?, Some(gid.parse().ok()?))),
        None => Some((user.trim().parse().ok()?, None)),
    }
}

/// Bind mount sources inside `working_dir` that are missing on disk, taken
/// from the merged `config --format json` document.
pub fn pending_mounts(config: &Value, working_dir: &Path) -> Vec<PendingMount> {
    let Some(services) = config.get("services").and_then(Value::as_object) else {
        return vec![];
    };

    let mut pending = vec![];
    for (service, definition) in services {
        let owner = definition
            .get("user")
            .and_then(Value::as_str)
            .and_then(parse_numeric_user);

        let volumes = definition
            .get("volumes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for volume in volumes {
            if volume.get("type").and_then(Value::as_str) != Some("bind") {
                continue;
            }
            let Some(source) = volume.get("source").and_then(Value::as_str) else {
                continue;
            };
            let source = PathBuf::from(source);
            if !source.starts_with(working_dir) || source.exists() {
                continue;
            }
            if pending.iter().any(|p: &PendingMount| p.source == source) {
                continue;
            }
            pending.push(PendingMount {
                service: service.clone(),
                source,
                owner,
            });
        }
    }
    pending
}

/// Create one pending mount. Returns a progress line for observers.
pub async fn create_mount(mount: &PendingMount) -> Result<String, DockhandError> {
    tokio::fs::create_dir_all(&mount.source).await.map_err(|e| {
        DockhandError::RuntimeError(format!(
            "Failed to create volume directory {}: {}",
            mount.source.display(),
            e
        ))
    })?;

    let Some((uid, gid)) = mount.owner else {
        info!("Created volume directory {}", mount.source.display());
        return Ok(format!("Created volume directory {}", mount.source.display()));
    };

    if let Err(e) = change_owner(&mount.source, uid, gid) {
        warn!(
            "Failed to chown {} to {} for service {}: {}",
            mount.source.display(),
            uid,
            mount.service,
            e
        );
        return Ok(format!(
            "Created volume directory {} (could not change owner: {})",
            mount.source.display(),
            e
        ));
    }

    info!(
        "Created volume directory {} owned by {}",
        mount.source.display(),
        uid
    );
    Ok(format!(
        "Created volume directory {} owned by {}",
        mount.source.display(),
        match gid {
            Some(gid) => format!("{}:{}", uid, gid),
            None => uid.to_string(),
        }
    ))
}

#[cfg(unix)]
fn change_owner(path: &Path, uid: u32, gid: Option<u32>) -> std::io::Result<()> {
    std::os::unix::fs::chown(path, Some(uid), gid)
}

#[cfg(not(unix))]
fn change_owner(_path: &Path, _uid: u32, _gid: Option<u32>) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "ownership changes are not supported on this platform",
    ))
}
