//! Session gate: persisted storage-state validation and cookie injection.
//!
//! A run only starts against an authenticated webmail context. The login
//! itself happens elsewhere; it leaves behind a storage-state file shaped like
//! `{"cookies": [...], "origins": [...]}`. This module checks that file before
//! orchestration begins and injects its cookies into the CDP page once per run.

use crate::error::ScoutError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SESSION_ONLY_TTL_SECS: f64 = 86_400.0;

/// Consulted once before the first item of a run.
#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn is_session_valid(&self) -> bool;
}

/// Persisted browser storage state. Only `cookies` is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Expiry helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Minimum finite cookie expiry (unix seconds). `-1` marks a session-only
/// cookie and is skipped; `None` when every cookie is session-only.
pub fn min_cookie_expiry(raw_cookies: &[serde_json::Value]) -> Option<f64> {
    raw_cookies
        .iter()
        .filter_map(|v| v.get("expires").and_then(|e| e.as_f64()))
        .filter(|&exp| exp > 0.0)
        .reduce(f64::min)
}

/// Like [`min_cookie_expiry`], but a jar of session-only cookies expires
/// 24 h after `issued_at` (the storage-state file's modification time).
///
/// `None` only for an empty jar.
pub fn effective_session_expiry(raw_cookies: &[serde_json::Value], issued_at: f64) -> Option<f64> {
    if raw_cookies.is_empty() {
        return None;
    }
    if let Some(min_exp) = min_cookie_expiry(raw_cookies) {
        return Some(min_exp);
    }
    Some(issued_at + SESSION_ONLY_TTL_SECS)
}

// ─────────────────────────────────────────────────────────────────────────────
// Load
// ─────────────────────────────────────────────────────────────────────────────

pub fn load_storage_state(path: &Path) -> anyhow::Result<StorageState> {
    use anyhow::Context;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading session file {}", path.display()))?;
    let state: StorageState = serde_json::from_str(&content)
        .with_context(|| format!("parsing session file {}", path.display()))?;
    Ok(state)
}

fn modified_unix_secs(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since.as_secs_f64())
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate
// ─────────────────────────────────────────────────────────────────────────────

/// Gate over a storage-state JSON file.
///
/// Valid when the file exists, parses, holds at least one cookie, and its
/// effective expiry lies in the future.
#[derive(Debug, Clone)]
pub struct StorageStateGate {
    path: PathBuf,
}

impl StorageStateGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Effective expiry (unix seconds) of a usable session, or the reason it
    /// is unusable.
    pub fn check(&self) -> Result<f64, ScoutError> {
        if !self.path.exists() {
            return Err(ScoutError::Session(format!(
                "session file {} not found",
                self.path.display()
            )));
        }
        let state = load_storage_state(&self.path)
            .map_err(|e| ScoutError::Session(format!("{:#}", e)))?;
        let issued_at = modified_unix_secs(&self.path)
            .unwrap_or_else(|| chrono::Utc::now().timestamp() as f64);
        let expiry = effective_session_expiry(&state.cookies, issued_at).ok_or_else(|| {
            ScoutError::Session(format!("session file {} has no cookies", self.path.display()))
        })?;
        let now = chrono::Utc::now().timestamp() as f64;
        if expiry <= now {
            return Err(ScoutError::Session(format!(
                "session expired {:.0}s ago",
                now - expiry
            )));
        }
        Ok(expiry)
    }
}

#[async_trait]
impl SessionGate for StorageStateGate {
    async fn is_session_valid(&self) -> bool {
        match self.check() {
            Ok(expiry) => {
                info!(
                    "session_store: 🍪 session valid until unix {:.0} ({})",
                    expiry,
                    self.path.display()
                );
                true
            }
            Err(e) => {
                warn!("session_store: {}", e);
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inject
// ─────────────────────────────────────────────────────────────────────────────

/// Inject stored cookies into a live CDP page before navigation.
///
/// Cookies that do not deserialize into a [`CookieParam`] are skipped.
/// Returns the number of cookies set.
///
/// [`CookieParam`]: chromiumoxide::cdp::browser_protocol::network::CookieParam
pub async fn inject_into_page(
    page: &chromiumoxide::Page,
    raw_cookies: &[serde_json::Value],
) -> anyhow::Result<usize> {
    use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};

    let cookie_params: Vec<CookieParam> = raw_cookies
        .iter()
        .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
        .collect();

    if cookie_params.is_empty() {
        warn!("session_store: storage state contained no valid cookies, skipping injection");
        return Ok(0);
    }

    let count = cookie_params.len();
    page.execute(SetCookiesParams::new(cookie_params)).await?;
    info!("session_store: 💉 injected {} session cookies into CDP page", count);
    Ok(count)
}
