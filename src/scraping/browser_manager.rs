//! Browser lifecycle using `chromiumoxide`.
//!
//! * Finding a usable Chromium-family executable (config → env → PATH → OS paths).
//! * Building a launch config with stealth flags and a rotated user agent.
//! * Opening the webmail page once per run: stealth script, session cookies,
//!   navigation, then a settle wait.

use crate::config::{chrome_executable_override, ScoutConfig};
use crate::features::session_store;
use crate::scraping::stealth;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen Chromium desktop User-Agent string.
///
/// Only Chromium UAs: the CDP engine underneath is always Chromium and a
/// Firefox/Safari UA would contradict the client hints.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `browser.chrome_executable` from config
/// 2. `CHROME_EXECUTABLE` env var
/// 3. PATH scan
/// 4. OS-specific well-known install paths
pub fn find_chrome_executable(config: &ScoutConfig) -> Option<String> {
    if let Some(p) = config.browser.chrome_executable.as_deref() {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("browser: configured chrome_executable '{}' does not exist", p);
    }
    if let Some(p) = chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "microsoft-edge",
            "brave-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/microsoft-edge",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` with stealth defaults.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag; the UA is drawn from `DESKTOP_USER_AGENTS`.
pub fn build_browser_config(exe: &str, headless: bool, width: u32, height: u32) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--lang=es-ES")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// A launched browser with the webmail page open and authenticated.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    pub page: Page,
}

impl BrowserSession {
    /// Launch, harden and authenticate one page, then navigate to the webmail.
    ///
    /// Cookies from `session_file` are injected once, before navigation.
    pub async fn open(config: &ScoutConfig, session_file: Option<&Path>) -> Result<Self> {
        let exe = find_chrome_executable(config).ok_or_else(|| {
            anyhow!("No browser found. Install Chrome, Chromium or Edge, or set CHROME_EXECUTABLE.")
        })?;
        let headless = config.resolve_headless();
        info!("🚀 browser: launching {} (headless={})", exe, headless);

        let launch = build_browser_config(
            &exe,
            headless,
            config.browser.width,
            config.browser.height,
        )?;
        let (browser, mut handler) = Browser::launch(launch)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser: CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create page: {}", e))?;

        stealth::inject_stealth(&page).await?;

        if let Some(path) = session_file {
            let state = session_store::load_storage_state(path)?;
            let injected = session_store::inject_into_page(&page, &state.cookies).await?;
            if injected == 0 {
                warn!("browser: no cookies injected; the page will likely ask for a login");
            }
        }

        let url = config.resolve_page_url();
        info!("🌐 browser: navigating to {}", url);
        let nav = Duration::from_millis(config.wait_times.navigation_ms);
        tokio::time::timeout(nav, page.goto(url.as_str()))
            .await
            .map_err(|_| anyhow!("Navigation to {} timed out after {}ms", url, nav.as_millis()))?
            .map_err(|e| anyhow!("Failed to navigate: {}", e))?;

        wait_until_stable(&page, 1500, config.wait_times.navigation_ms).await;

        Ok(Self {
            browser,
            handler,
            page,
        })
    }

    /// URL the page ended up on (a login redirect shows up here).
    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser: close failed: {}", e);
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("🛑 browser: shut down");
    }
}

/// Wait until the page stops loading resources (no new entries for `quiet_ms`)
/// or `timeout_ms` elapses.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let poll = Duration::from_millis(250);
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            info!("wait_until_stable: timeout after {}ms", timeout_ms);
            return;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete || count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            info!(
                "wait_until_stable: idle after {}ms ({} resources)",
                start.elapsed().as_millis(),
                count
            );
            return;
        }

        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agents_are_chromium_only() {
        for _ in 0..20 {
            let ua = random_user_agent();
            assert!(ua.contains("Chrome/"), "{}", ua);
        }
    }

    #[test]
    fn configured_executable_must_exist() {
        let mut cfg = ScoutConfig::default();
        cfg.browser.chrome_executable = Some("/definitely/not/a/browser".to_string());
        if let Some(found) = find_chrome_executable(&cfg) {
            assert_ne!(found, "/definitely/not/a/browser");
        }
    }
}
