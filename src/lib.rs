pub mod core;
pub mod extraction;
pub mod features;
pub mod scraping;
pub mod setup;
pub mod tools;

// --- Primary core exports ---
pub use core::config;
pub use core::error;
pub use core::types;
pub use core::types::*;
pub use core::{BrowserFault, ScoutConfig, ScoutError};

pub use extraction::FieldExtractor;
pub use features::{humanize, results, session_store};
pub use tools::{batch, workflow};
