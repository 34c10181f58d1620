//! Scripted browser and session gates shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use contact_scout::config::{ScoutConfig, WaitTimes};
use contact_scout::features::humanize::{ActionKind, Pacer, PointerPoint};
use contact_scout::features::session_store::SessionGate;
use contact_scout::scraping::{CaptureScope, ContactCardBrowser};
use contact_scout::{BrowserFault, FieldKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Tight bounds so timeouts fire in milliseconds.
pub fn fast_config() -> ScoutConfig {
    let mut config = ScoutConfig::default();
    config.humanize.enabled = false;
    config.wait_times = WaitTimes {
        navigation_ms: 200,
        compose_ready_ms: 100,
        token_located_ms: 50,
        popup_visible_ms: 50,
        selector_read_ms: 20,
        close_ms: 50,
        poll_interval_ms: 5,
    };
    config
}

/// How the fake UI reacts to one address.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub token_visible: bool,
    pub card_hangs: bool,
    pub card_text: Option<String>,
    pub structured: BTreeMap<FieldKind, String>,
}

impl Script {
    /// Token resolves and the card shows `text`.
    pub fn card(text: &str) -> Self {
        Self {
            token_visible: true,
            card_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    /// The recipient never resolves to a token.
    pub fn missing() -> Self {
        Self::default()
    }

    /// Token resolves but clicking it never returns.
    pub fn hanging_card() -> Self {
        Self {
            token_visible: true,
            card_hangs: true,
            ..Default::default()
        }
    }

    pub fn with_structured(mut self, kind: FieldKind, value: &str) -> Self {
        self.structured.insert(kind, value.to_string());
        self
    }
}

/// Counters a test keeps after the browser moves into the orchestrator.
#[derive(Debug, Default)]
pub struct CallLog {
    pub compose_opened: AtomicUsize,
    pub compose_closed: AtomicUsize,
    pub cards_opened: AtomicUsize,
    pub cards_closed: AtomicUsize,
    pub typed: Mutex<Vec<String>>,
}

impl CallLog {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

/// Unscripted addresses behave like [`Script::missing`].
pub struct FakeBrowser {
    scripts: HashMap<String, Script>,
    current: Mutex<Option<String>>,
    card_open: AtomicBool,
    pub calls: Arc<CallLog>,
}

impl FakeBrowser {
    pub fn new<I>(scripts: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Script)>,
    {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(id, s)| (id.to_lowercase(), s))
                .collect(),
            current: Mutex::new(None),
            card_open: AtomicBool::new(false),
            calls: Arc::new(CallLog::default()),
        }
    }

    fn script(&self) -> Script {
        self.current
            .lock()
            .ok()
            .and_then(|c| c.clone())
            .and_then(|id| self.scripts.get(&id.to_lowercase()).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContactCardBrowser for FakeBrowser {
    type Token = String;

    async fn open_compose(&self, _pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        self.calls.compose_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn type_recipient(&self, text: &str, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        for ch in text.chars() {
            let delay = pacer.keystroke_delay(ch);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        if let Ok(mut typed) = self.calls.typed.lock() {
            typed.push(text.to_string());
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(text.to_string());
        }
        Ok(())
    }

    async fn find_token(&self, identifier: &str) -> Result<Option<String>, BrowserFault> {
        Ok(self
            .script()
            .token_visible
            .then(|| identifier.to_string()))
    }

    async fn open_card(&self, _token: &String, _pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        self.calls.cards_opened.fetch_add(1, Ordering::SeqCst);
        if self.script().card_hangs {
            std::future::pending::<()>().await;
        }
        self.card_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_text(&self, scope: CaptureScope) -> Result<Option<String>, BrowserFault> {
        if scope == CaptureScope::Card && !self.card_open.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.script().card_text)
    }

    async fn read_selector(
        &self,
        _scope: CaptureScope,
        kind: FieldKind,
    ) -> Result<Option<String>, BrowserFault> {
        Ok(self.script().structured.get(&kind).cloned())
    }

    async fn close_card(&self) -> Result<(), BrowserFault> {
        self.calls.cards_closed.fetch_add(1, Ordering::SeqCst);
        self.card_open.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close_compose(&self) -> Result<(), BrowserFault> {
        self.calls.compose_closed.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        Ok(())
    }
}

/// Types every key after a fixed delay; no other pauses.
pub struct SteadyTypist {
    pub per_key: Duration,
    pub declares_allowance: bool,
}

#[async_trait]
impl Pacer for SteadyTypist {
    async fn before_action(&self, _kind: ActionKind) {}

    fn keystroke_delay(&self, _ch: char) -> Duration {
        self.per_key
    }

    fn motion_path(&self, _start: PointerPoint, end: PointerPoint) -> Vec<PointerPoint> {
        vec![end]
    }

    fn typing_allowance(&self, text: &str) -> Duration {
        if self.declares_allowance {
            self.per_key * (text.chars().count() as u32 * 2)
        } else {
            Duration::ZERO
        }
    }
}

pub struct StaticGate(pub bool);

#[async_trait]
impl SessionGate for StaticGate {
    async fn is_session_valid(&self) -> bool {
        self.0
    }
}

pub const SAMPLE_CARD: &str = "DOE, JOHN\n\
john.doe@example.org\n\
SIP:john.doe@example.org\n\
916704092\n\
C/ MAYOR, 1 28001 MADRID";
