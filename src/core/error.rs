use thiserror::Error;

/// Error taxonomy for a contact-scout run.
///
/// `NotFound`, `PopupTimeout` and `Interaction` are per-item outcomes: the item
/// workflow converts them into a [`crate::types::ContactRecord`] and they never
/// leave it. `Session` and `Configuration` are run-level and abort a run before
/// the first item is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoutError {
    #[error("recipient token for '{0}' never resolved")]
    NotFound(String),

    #[error("contact card did not become visible: {0}")]
    PopupTimeout(String),

    #[error("interaction failed: {0}")]
    Interaction(String),

    #[error("session invalid: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ScoutError {
    /// Run-level errors abort before any item is processed.
    pub fn is_run_level(&self) -> bool {
        matches!(self, ScoutError::Session(_) | ScoutError::Configuration(_))
    }
}

/// Fault raised by a browser capability call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrowserFault {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("element detached: {0}")]
    Detached(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl From<chromiumoxide::error::CdpError> for BrowserFault {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        match e {
            chromiumoxide::error::CdpError::Timeout => BrowserFault::Timeout(e.to_string()),
            chromiumoxide::error::CdpError::NotFound => BrowserFault::Detached(e.to_string()),
            other => BrowserFault::Protocol(other.to_string()),
        }
    }
}
