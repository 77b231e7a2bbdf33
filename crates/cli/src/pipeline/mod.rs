//! Pipeline wiring and lifecycle management.

mod orchestrator;

pub use orchestrator::Pipeline;
