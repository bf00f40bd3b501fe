//! Settings, on-disk layout and the workload repository

pub mod json;
pub mod layout;
pub mod memory;
pub mod settings;
pub mod store;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use store::WorkloadStore;
