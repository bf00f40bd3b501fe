//! Application wiring and lifecycle

pub mod context;
pub mod options;
pub mod run;
