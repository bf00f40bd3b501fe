//! Container status report parsing and stack aggregation

use serde::{Deserialize, Serialize};

use crate::errors::DockhandError;

/// Aggregate state of a stack
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StackState {
    Running,
    Stopped,
    Error,
}

/// One container as reported by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerStatus {
    pub service: String,
    pub name: String,

    /// Machine state, e.g. `running` or `exited`
    pub state: String,

    /// Human status, e.g. `Up 5 minutes`
    pub status: String,

    /// Empty when not running
    pub uptime: String,

    pub exit_code: i64,
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Stack report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackStatus {
    pub state: StackState,

    /// Uptime of the first running container
    pub uptime: String,

    pub containers: Vec<ContainerStatus>,
}

impl StackStatus {
    /// No containers or none running is Stopped, all running is Running,
    /// anything in between is Error.
    pub fn aggregate(containers: Vec<ContainerStatus>) -> Self {
        let running = containers.iter().filter(|c| c.is_running()).count();

        let state = if running == 0 {
            StackState::Stopped
        } else if running == containers.len() {
            StackState::Running
        } else {
            StackState::Error
        };

        let uptime = match state {
            StackState::Stopped => String::new(),
            _ => containers
                .iter()
                .find(|c| c.is_running())
                .map(|c| c.uptime.clone())
                .unwrap_or_default(),
        };

        Self {
            state,
            uptime,
            containers,
        }
    }
}

/// Entry of `ps --format json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsEntry {
    #[serde(default)]
    service: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    exit_code: i64,
}

impl From<PsEntry> for ContainerStatus {
    fn from(entry: PsEntry) -> Self {
        let uptime = uptime_from_status(&entry.state, &entry.status);
        Self {
            service: entry.service,
            name: entry.name,
            state: entry.state,
            status: entry.status,
            uptime,
            exit_code: entry.exit_code,
        }
    }
}

/// `Up 5 minutes (healthy)` gives `5 minutes`
fn uptime_from_status(state: &str, status: &str) -> String {
    if !state.eq_ignore_ascii_case("running") {
        return String::new();
    }
    status
        .strip_prefix("Up ")
        .map(|rest| rest.split(" (").next().unwrap_or(rest).trim().to_string())
        .unwrap_or_default()
}

/// Parse `ps --format json`. Older runtimes print one JSON array, newer ones
/// one object per line.
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerStatus>, DockhandError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }

    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| {
            DockhandError::RuntimeError(format!("Failed to parse container status: {}", e))
        })?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<PsEntry>)
            .collect::<Result<_, _>>()
            .map_err(|e| {
                DockhandError::RuntimeError(format!("Failed to parse container status: {}", e))
            })?
    };

    Ok(entries.into_iter().map(ContainerStatus::from).collect())
}
