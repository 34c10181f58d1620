use crate::types::FieldKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (contact-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "CONTACT_SCOUT_CONFIG";
pub const ENV_PAGE_URL: &str = "CONTACT_SCOUT_PAGE_URL";
pub const ENV_SESSION_FILE: &str = "CONTACT_SCOUT_SESSION_FILE";
pub const ENV_HEADLESS: &str = "CONTACT_SCOUT_HEADLESS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

const DEFAULT_PAGE_URL: &str = "https://outlook.office.com/mail/";

/// Inclusive millisecond range a humanized delay is sampled from.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Inverted bounds are swapped rather than rejected.
    pub fn normalized(self) -> Self {
        if self.min_ms > self.max_ms {
            Self::new(self.max_ms, self.min_ms)
        } else {
            self
        }
    }
}

/// Browser launch settings.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub width: u32,
    pub height: u32,
    /// Explicit browser binary. `CHROME_EXECUTABLE` and auto-discovery apply when unset.
    pub chrome_executable: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            width: 1280,
            height: 720,
            chrome_executable: None,
        }
    }
}

/// CSS selectors for the webmail surface.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Selectors {
    pub new_message: String,
    pub recipient_field: String,
    pub recipient_token: String,
    pub popup: String,
    pub discard: String,
    /// Per-field selector candidates, tried in order inside the popup.
    pub fields: BTreeMap<FieldKind, Vec<String>>,
}

impl Default for Selectors {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            FieldKind::FullName,
            vec![
                "span._pe_c1._pe_t1".to_string(),
                "div.ms-ContactCard-primaryText".to_string(),
                "[data-automation-id=\"contactCardName\"]".to_string(),
                ".ms-PersonaCard-primaryText".to_string(),
            ],
        );
        fields.insert(
            FieldKind::PersonalEmail,
            vec![
                "a[href^=\"mailto:\"]".to_string(),
                "[data-automation-id=\"contactCardEmail\"]".to_string(),
            ],
        );
        fields.insert(
            FieldKind::WorkPhone,
            vec![
                "a[href^=\"tel:\"]".to_string(),
                "[data-automation-id=\"contactCardPhone\"]".to_string(),
                ".ms-ContactCard-phoneText".to_string(),
            ],
        );
        fields.insert(
            FieldKind::Department,
            vec![
                "[data-automation-id=\"contactCardTitle\"]".to_string(),
                ".ms-ContactCard-jobTitle".to_string(),
            ],
        );
        fields.insert(
            FieldKind::Company,
            vec![
                "[data-automation-id=\"contactCardCompany\"]".to_string(),
                ".ms-ContactCard-company".to_string(),
            ],
        );
        fields.insert(
            FieldKind::OfficeLocation,
            vec![
                "[data-automation-id=\"contactCardOffice\"]".to_string(),
                ".ms-ContactCard-office".to_string(),
            ],
        );

        Self {
            new_message: "button[title=\"Escribir un mensaje nuevo (N)\"]".to_string(),
            recipient_field: "div[role=\"textbox\"][aria-label=\"Para\"]".to_string(),
            recipient_token: "span".to_string(),
            popup: "div._pe_Y[ispopup='1']".to_string(),
            discard: "button[aria-label=\"Descartar\"]".to_string(),
            fields,
        }
    }
}

/// Bounded waits and polling cadence (milliseconds).
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct WaitTimes {
    pub navigation_ms: u64,
    pub compose_ready_ms: u64,
    pub token_located_ms: u64,
    pub popup_visible_ms: u64,
    pub selector_read_ms: u64,
    pub close_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitTimes {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            compose_ready_ms: 10_000,
            token_located_ms: 6_000,
            popup_visible_ms: 5_000,
            selector_read_ms: 1_000,
            close_ms: 6_000,
            poll_interval_ms: 250,
        }
    }
}

/// Humanized pacing (see `features::humanize`).
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct HumanizeConfig {
    pub enabled: bool,
    pub between_actions: DelayRange,
    pub between_items: DelayRange,
    pub after_typing: DelayRange,
    pub after_click: DelayRange,
    pub after_close_popup: DelayRange,
    /// Total duration of one pointer movement.
    pub mouse_move: DelayRange,
    pub typing_chars_per_second_min: f64,
    pub typing_chars_per_second_max: f64,
    /// Chance that a keystroke opens a short fast burst.
    pub burst_typing_chance: f64,
    pub mouse_offset_px: f64,
    pub mouse_overshoot_chance: f64,
    pub mouse_path_steps: usize,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            between_actions: DelayRange::new(500, 2000),
            between_items: DelayRange::new(3000, 8000),
            after_typing: DelayRange::new(200, 800),
            after_click: DelayRange::new(800, 1500),
            after_close_popup: DelayRange::new(1000, 2000),
            mouse_move: DelayRange::new(500, 1500),
            typing_chars_per_second_min: 2.0,
            typing_chars_per_second_max: 6.0,
            burst_typing_chance: 0.3,
            mouse_offset_px: 10.0,
            mouse_overshoot_chance: 0.15,
            mouse_path_steps: 50,
        }
    }
}

/// Knobs for the pattern rules of the extraction engine.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Digits in a work phone number (9 for Spanish numbering).
    pub phone_digits: usize,
    pub street_markers: Vec<String>,
    /// All-caps section headings of the card that are never field values.
    pub ignored_headings: Vec<String>,
    /// Prefixes of institutional mailboxes (`ASP123@…`) skipped for the personal e-mail.
    pub generic_mailbox_prefixes: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            phone_digits: 9,
            street_markers: strings(&[
                "C/", "CL.", "CALLE", "AVDA", "AVDA.", "AV.", "AVENIDA", "PLAZA", "PZA", "PZA.",
                "PASEO", "CTRA", "CTRA.", "CARRETERA", "CAMINO", "RONDA", "GLORIETA", "TRAVESIA",
                "TRAVESÍA",
            ]),
            ignored_headings: strings(&[
                "CONTACTO",
                "NOTAS",
                "ORGANIZACIÓN",
                "ORGANIZACION",
                "CONTACT",
                "NOTES",
                "ORGANIZATION",
            ]),
            generic_mailbox_prefixes: strings(&["ASP", "AGM", "AEM", "ADM"]),
        }
    }
}

/// Top-level config loaded from `contact-scout.json`.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ScoutConfig {
    pub page_url: Option<String>,
    pub session_file: Option<String>,
    pub browser: BrowserSettings,
    pub selectors: Selectors,
    pub wait_times: WaitTimes,
    pub humanize: HumanizeConfig,
    pub extraction: ExtractionConfig,
}

impl ScoutConfig {
    /// Webmail URL: `CONTACT_SCOUT_PAGE_URL` env → JSON field → Outlook web default.
    pub fn resolve_page_url(&self) -> String {
        if let Ok(v) = std::env::var(ENV_PAGE_URL) {
            if !v.trim().is_empty() {
                return v.trim().to_string();
            }
        }
        self.page_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_PAGE_URL)
            .to_string()
    }

    /// Storage-state file: `CONTACT_SCOUT_SESSION_FILE` env → JSON field →
    /// `~/.contact-scout/state.json`.
    pub fn resolve_session_file(&self) -> Option<PathBuf> {
        if let Ok(v) = std::env::var(ENV_SESSION_FILE) {
            if !v.trim().is_empty() {
                return Some(PathBuf::from(v.trim()));
            }
        }
        if let Some(p) = self.session_file.as_deref().filter(|p| !p.trim().is_empty()) {
            return Some(PathBuf::from(p.trim()));
        }
        let home = dirs::home_dir()?;
        Some(home.join(".contact-scout").join("state.json"))
    }

    /// Headless when the JSON field (or `--headless`) says so, or when
    /// `CONTACT_SCOUT_HEADLESS` is `1`/`true`/`yes`/`on`.
    pub fn resolve_headless(&self) -> bool {
        self.browser.headless
            || std::env::var(ENV_HEADLESS).is_ok_and(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
    }

    /// Swap inverted delay ranges so downstream sampling never sees `min > max`.
    pub fn normalize(mut self) -> Self {
        let h = &mut self.humanize;
        for range in [
            &mut h.between_actions,
            &mut h.between_items,
            &mut h.after_typing,
            &mut h.after_click,
            &mut h.after_close_popup,
            &mut h.mouse_move,
        ] {
            *range = range.normalized();
        }
        if h.typing_chars_per_second_min > h.typing_chars_per_second_max {
            std::mem::swap(
                &mut h.typing_chars_per_second_min,
                &mut h.typing_chars_per_second_max,
            );
        }
        self
    }

    /// Every problem found; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let page_url = self.resolve_page_url();
        match url::Url::parse(&page_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => issues.push(format!("page_url must be http(s), got scheme '{}'", u.scheme())),
            Err(e) => issues.push(format!("page_url '{}' is not a valid URL: {}", page_url, e)),
        }

        let s = &self.selectors;
        for (name, value) in [
            ("selectors.new_message", &s.new_message),
            ("selectors.recipient_field", &s.recipient_field),
            ("selectors.recipient_token", &s.recipient_token),
            ("selectors.popup", &s.popup),
            ("selectors.discard", &s.discard),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("{} must not be empty", name));
            }
        }

        let w = &self.wait_times;
        if w.poll_interval_ms == 0 {
            issues.push("wait_times.poll_interval_ms must be greater than zero".to_string());
        }
        for (name, value) in [
            ("wait_times.compose_ready_ms", w.compose_ready_ms),
            ("wait_times.token_located_ms", w.token_located_ms),
            ("wait_times.popup_visible_ms", w.popup_visible_ms),
        ] {
            if value < w.poll_interval_ms {
                issues.push(format!(
                    "{} ({}) must be at least poll_interval_ms ({})",
                    name, value, w.poll_interval_ms
                ));
            }
        }

        let h = &self.humanize;
        if !(h.typing_chars_per_second_min > 0.0 && h.typing_chars_per_second_min.is_finite()) {
            issues.push("humanize.typing_chars_per_second_min must be positive".to_string());
        }
        if !h.typing_chars_per_second_max.is_finite()
            || h.typing_chars_per_second_max < h.typing_chars_per_second_min
        {
            issues.push(
                "humanize.typing_chars_per_second_max must be at least typing_chars_per_second_min"
                    .to_string(),
            );
        }
        if !(0.0..=1.0).contains(&h.mouse_overshoot_chance) {
            issues.push("humanize.mouse_overshoot_chance must be within 0..=1".to_string());
        }
        if !(0.0..=1.0).contains(&h.burst_typing_chance) {
            issues.push("humanize.burst_typing_chance must be within 0..=1".to_string());
        }

        if self.extraction.phone_digits < 6 || self.extraction.phone_digits > 15 {
            issues.push(format!(
                "extraction.phone_digits must be within 6..=15, got {}",
                self.extraction.phone_digits
            ));
        }

        issues
    }
}

/// Load `contact-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `explicit` path (the `--config` flag)
/// 2. `CONTACT_SCOUT_CONFIG` env var path
/// 3. `./contact-scout.json`
/// 4. `../contact-scout.json`
///
/// Missing file → `ScoutConfig::default()`.
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config(explicit: Option<&Path>) -> ScoutConfig {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from("contact-scout.json"),
        PathBuf::from("../contact-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }
    if let Some(p) = explicit {
        candidates.insert(0, p.to_path_buf());
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match parse_scout_config(&contents) {
            Ok(cfg) => {
                tracing::info!("contact-scout.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "contact-scout.json parse error at {}: {}; using defaults",
                    path.display(),
                    e
                );
                ScoutConfig::default()
            }
        };
    }

    ScoutConfig::default()
}

pub fn parse_scout_config(contents: &str) -> Result<ScoutConfig, serde_json::Error> {
    serde_json::from_str::<ScoutConfig>(contents).map(ScoutConfig::normalize)
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ScoutConfig::default();
        assert!(cfg.validate().is_empty(), "{:?}", cfg.validate());
        assert_eq!(cfg.extraction.phone_digits, 9);
        assert!(cfg.selectors.fields.contains_key(&FieldKind::FullName));
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_sections() {
        let cfg = parse_scout_config(
            r#"{"page_url": "https://mail.example.org/owa/", "wait_times": {"popup_visible_ms": 900}}"#,
        )
        .unwrap();
        assert_eq!(cfg.page_url.as_deref(), Some("https://mail.example.org/owa/"));
        assert_eq!(cfg.wait_times.popup_visible_ms, 900);
        assert_eq!(cfg.wait_times.poll_interval_ms, 250);
        assert!(cfg.humanize.enabled);
    }

    #[test]
    fn inverted_ranges_are_swapped() {
        let cfg = parse_scout_config(
            r#"{"humanize": {"between_items": {"min_ms": 900, "max_ms": 100}}}"#,
        )
        .unwrap();
        assert_eq!(cfg.humanize.between_items, DelayRange::new(100, 900));
    }

    #[test]
    fn field_selectors_deserialize_by_kind() {
        let cfg = parse_scout_config(
            r#"{"selectors": {"fields": {"full_name": [".card-name"]}}}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.selectors.fields.get(&FieldKind::FullName),
            Some(&vec![".card-name".to_string()])
        );
    }

    #[test]
    fn validate_reports_bad_values() {
        let mut cfg = ScoutConfig::default();
        cfg.page_url = Some("not a url".to_string());
        cfg.extraction.phone_digits = 2;
        cfg.wait_times.poll_interval_ms = 0;
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.contains("page_url")));
        assert!(issues.iter().any(|i| i.contains("phone_digits")));
        assert!(issues.iter().any(|i| i.contains("poll_interval_ms")));
    }

    #[test]
    fn validate_rejects_typing_rates_that_break_the_typing_bound() {
        let mut cfg = ScoutConfig::default();
        cfg.humanize.typing_chars_per_second_min = 0.0;
        let issues = cfg.validate();
        assert!(issues.iter().any(|i| i.contains("typing_chars_per_second_min")));

        let mut cfg = ScoutConfig::default();
        cfg.humanize.typing_chars_per_second_min = 4.0;
        cfg.humanize.typing_chars_per_second_max = 1.0;
        assert!(cfg
            .validate()
            .iter()
            .any(|i| i.contains("typing_chars_per_second_max")));
        // normalize swaps the pair back into a usable order
        assert!(cfg.normalize().validate().is_empty());
    }
}
