pub mod batch;
pub mod workflow;

pub use batch::{dedup_identifiers, BatchControl, BatchOrchestrator, ControlRequest};
pub use workflow::{ItemState, ItemWorkflow};
