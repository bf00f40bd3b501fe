//! Auto-deploy poller

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::deploy::DeploymentCoordinator;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Initial delay before first poll
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the poller worker
pub async fn run<S, F>(
    options: &Options,
    coordinator: &DeploymentCoordinator,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Poller worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Poller worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        let deployed = poll_once(coordinator).await;
        debug!("Poll finished, {} deployment(s) triggered", deployed);

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}

/// Check every auto-deploy workload once. Returns how many deployments ran.
pub async fn poll_once(coordinator: &DeploymentCoordinator) -> usize {
    let workloads = match coordinator.list().await {
        Ok(workloads) => workloads,
        Err(e) => {
            error!("Failed to list workloads: {}", e);
            return 0;
        }
    };

    let mut deployed = 0;
    for workload in workloads.iter().filter(|w| w.auto_deploy) {
        match coordinator.check_for_update(&workload.id).await {
            Ok(Some(deployment)) => {
                info!(
                    "Auto-deployed {} (deployment {})",
                    workload.name, deployment.id
                );
                deployed += 1;
            }
            Ok(None) => debug!("{} is up to date", workload.name),
            Err(e) => error!("Auto-deploy check for {} failed: {}", workload.name, e),
        }
    }
    deployed
}
