//! Dockhand Library
//!
//! Deploys Compose workloads sourced from Git repositories and keeps them
//! running on a single host.

pub mod app;
pub mod compose;
pub mod credentials;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod git;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
