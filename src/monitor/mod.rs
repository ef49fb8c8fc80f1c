//! Per-group wall monitors and the registry that owns them.

pub mod registry;
pub mod task;

pub use registry::{MonitorRegistry, StartOutcome};
pub use task::MonitorDeps;
