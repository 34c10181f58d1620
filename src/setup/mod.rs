//! Pre-flight checks for `contact-scout --check`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ScoutConfig;
use crate::features::session_store::StorageStateGate;
use crate::scraping::browser_manager::find_chrome_executable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skip,
}

impl CheckStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, CheckStatus::Fail)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupCheck {
    pub id: String,
    pub title: String,
    pub status: CheckStatus,
    pub details: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

impl SetupCheck {
    fn new(id: &str, title: &str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            status,
            details: details.into(),
            actions: Vec::new(),
        }
    }

    fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetupReport {
    pub checks: Vec<SetupCheck>,
}

impl SetupReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_fail())
    }

    pub fn summarize_for_logs(&self) -> String {
        let mut pass = 0;
        let mut warn_count = 0;
        let mut fail = 0;
        let mut skip = 0;
        for c in &self.checks {
            match c.status {
                CheckStatus::Pass => pass += 1,
                CheckStatus::Warn => warn_count += 1,
                CheckStatus::Fail => fail += 1,
                CheckStatus::Skip => skip += 1,
            }
        }
        format!(
            "setup: {} pass, {} warn, {} fail, {} skip",
            pass, warn_count, fail, skip
        )
    }

    pub fn log_action_required(&self) {
        for check in self.checks.iter().filter(|c| !c.actions.is_empty()) {
            warn!("ACTION REQUIRED: {}: {}", check.title, check.details);
        }
    }
}

impl fmt::Display for SetupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "contact-scout pre-flight")?;
        writeln!(f, "{}", "=".repeat(24))?;
        for c in &self.checks {
            writeln!(
                f,
                "[{:<4}] {}\n  {}",
                match c.status {
                    CheckStatus::Pass => "OK",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                    CheckStatus::Skip => "SKIP",
                },
                c.title,
                c.details.replace('\n', "\n  ")
            )?;
            for action in &c.actions {
                writeln!(f, "    - {}", action)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn check_all(config: &ScoutConfig, output: Option<&Path>) -> SetupReport {
    let mut report = SetupReport::default();
    report.checks.push(check_config(config));
    report.checks.push(check_session(config));
    report.checks.push(check_browser(config));
    report.checks.push(check_output(output));
    report
}

fn check_config(config: &ScoutConfig) -> SetupCheck {
    let issues = config.validate();
    if issues.is_empty() {
        SetupCheck::new(
            "config",
            "Configuration",
            CheckStatus::Pass,
            format!("page_url: {}", config.resolve_page_url()),
        )
    } else {
        SetupCheck::new("config", "Configuration", CheckStatus::Fail, issues.join("\n"))
            .with_action("Fix contact-scout.json (or remove it to use defaults)")
    }
}

fn check_session(config: &ScoutConfig) -> SetupCheck {
    let Some(path) = config.resolve_session_file() else {
        return SetupCheck::new(
            "session",
            "Authenticated session",
            CheckStatus::Fail,
            "no session file configured and no home directory to default to",
        )
        .with_action("Set CONTACT_SCOUT_SESSION_FILE or `session_file` in contact-scout.json");
    };
    match StorageStateGate::new(&path).check() {
        Ok(expiry) => {
            let until = chrono::DateTime::from_timestamp(expiry as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| format!("unix {:.0}", expiry));
            SetupCheck::new(
                "session",
                "Authenticated session",
                CheckStatus::Pass,
                format!("{} valid until {}", path.display(), until),
            )
        }
        Err(e) => SetupCheck::new("session", "Authenticated session", CheckStatus::Fail, e.to_string())
            .with_action("Log in to the webmail and export the browser storage state to the session file"),
    }
}

fn check_browser(config: &ScoutConfig) -> SetupCheck {
    match find_chrome_executable(config) {
        Some(exe) => SetupCheck::new("browser", "Chromium-family browser", CheckStatus::Pass, exe),
        None => SetupCheck::new(
            "browser",
            "Chromium-family browser",
            CheckStatus::Fail,
            "no Chrome, Chromium or Edge executable found",
        )
        .with_action("Install Chrome/Chromium or set CHROME_EXECUTABLE"),
    }
}

fn check_output(output: Option<&Path>) -> SetupCheck {
    let Some(path) = output else {
        return SetupCheck::new(
            "output",
            "Results file",
            CheckStatus::Skip,
            "no --output given; records go to stdout",
        );
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if dir.is_dir() {
        SetupCheck::new("output", "Results file", CheckStatus::Pass, path.display().to_string())
    } else {
        SetupCheck::new(
            "output",
            "Results file",
            CheckStatus::Warn,
            format!("directory {} does not exist", dir.display()),
        )
        .with_action(format!("Create {}", dir.display()))
    }
}
