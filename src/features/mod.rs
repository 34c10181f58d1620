pub mod humanize;
pub mod results;
pub mod session_store;

pub use humanize::{ActionKind, HumanPacer, InstantPacer, Pacer, PointerPoint};
pub use session_store::{SessionGate, StorageStateGate};
