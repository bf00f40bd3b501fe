//! Deployment orchestration

pub mod coordinator;
pub mod fsm;
pub mod locks;
pub mod monitor;
pub mod relay;

pub use coordinator::DeploymentCoordinator;
pub use monitor::StatusMonitor;
pub use relay::Observer;
