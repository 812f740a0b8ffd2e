//! Application layer: drives plans produced by the services layer against
//! the domain ports.

pub mod orchestrator;

pub use orchestrator::{ExecutionEvent, Orchestrator};
