//! Domain models

pub mod deployment;
pub mod stream;
pub mod workload;
