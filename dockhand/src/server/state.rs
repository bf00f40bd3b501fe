//! Server state

use std::sync::Arc;

use crate::deploy::DeploymentCoordinator;

/// Server state shared across handlers
pub struct ServerState {
    pub coordinator: Arc<DeploymentCoordinator>,
}

impl ServerState {
    pub fn new(coordinator: Arc<DeploymentCoordinator>) -> Self {
        Self { coordinator }
    }
}
