//! Per-address item workflow.
//!
//! `Idle → ComposeOpened → RecipientLocated → CardOpen → Extracted → Closed`,
//! with `ItemFailed` reachable from every non-terminal state. Every browser
//! call is bounded; whatever happens, the card and the compose form are closed
//! and exactly one [`ContactRecord`] comes out.

use crate::config::WaitTimes;
use crate::error::{BrowserFault, ScoutError};
use crate::extraction::FieldExtractor;
use crate::features::humanize::{ActionKind, Pacer};
use crate::scraping::card_browser::{CaptureScope, ContactCardBrowser};
use crate::types::{ContactRecord, ExtractedFields, FieldKind, RawPopupCapture};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Idle,
    ComposeOpened,
    RecipientLocated,
    CardOpen,
    Extracted,
    Closed,
    ItemFailed,
}

fn log_state(identifier: &str, state: ItemState) {
    info!("contact_card_state={:?} identifier={}", state, identifier);
}

pub struct ItemWorkflow<'a, B: ContactCardBrowser> {
    browser: &'a B,
    pacer: &'a dyn Pacer,
    extractor: &'a FieldExtractor,
    waits: &'a WaitTimes,
}

impl<'a, B: ContactCardBrowser> ItemWorkflow<'a, B> {
    pub fn new(
        browser: &'a B,
        pacer: &'a dyn Pacer,
        extractor: &'a FieldExtractor,
        waits: &'a WaitTimes,
    ) -> Self {
        Self {
            browser,
            pacer,
            extractor,
            waits,
        }
    }

    /// Drive one address to a terminal record. Never fails.
    pub async fn run(&self, identifier: &str) -> ContactRecord {
        let started = Instant::now();
        let mut state = ItemState::Idle;
        log_state(identifier, state);

        let mut partial = ExtractedFields::default();
        let outcome = self.drive(identifier, &mut state, &mut partial).await;

        if matches!(outcome, Err(ref e) if !matches!(e, ScoutError::NotFound(_))) {
            state = ItemState::ItemFailed;
            log_state(identifier, state);
        }
        self.close_all(identifier).await;

        let record = match outcome {
            Ok(fields) if fields.is_empty() => ContactRecord::not_found(identifier, fields),
            Ok(fields) => ContactRecord::success(identifier, fields),
            Err(ScoutError::NotFound(_)) => ContactRecord::not_found(identifier, partial),
            Err(e) => {
                warn!("contact_card: {} failed: {}", identifier, e);
                ContactRecord::error(identifier, e.to_string(), partial)
            }
        };
        if state != ItemState::ItemFailed {
            log_state(identifier, ItemState::Closed);
        }
        info!(
            "contact_card: {} -> {} ({} fields, {}ms)",
            identifier,
            record.status,
            record.fields.values.len(),
            started.elapsed().as_millis()
        );
        record
    }

    async fn drive(
        &self,
        identifier: &str,
        state: &mut ItemState,
        partial: &mut ExtractedFields,
    ) -> Result<ExtractedFields, ScoutError> {
        self.pacer.before_action(ActionKind::Click).await;
        bounded(
            "open_compose",
            self.waits.compose_ready_ms,
            self.browser.open_compose(self.pacer),
        )
        .await?;
        self.advance(identifier, state, ItemState::ComposeOpened);

        self.pacer.before_action(ActionKind::Type).await;
        // the field wait keeps its own bound; paced typing time comes on top
        let typing_ms = self.waits.compose_ready_ms.saturating_add(
            u64::try_from(self.pacer.typing_allowance(identifier).as_millis()).unwrap_or(u64::MAX),
        );
        bounded(
            "type_recipient",
            typing_ms,
            self.browser.type_recipient(identifier, self.pacer),
        )
        .await?;
        let token = self.locate_token(identifier).await?;
        self.advance(identifier, state, ItemState::RecipientLocated);

        self.pacer.before_action(ActionKind::Click).await;
        bounded(
            "open_card",
            self.waits.popup_visible_ms,
            self.browser.open_card(&token, self.pacer),
        )
        .await?;
        let text = self.await_card_text().await?;
        self.advance(identifier, state, ItemState::CardOpen);

        let capture = self.capture(text).await;
        let fields = self.extractor.consolidate(&capture);
        *partial = fields.clone();
        if let Some(name) = fields.get(FieldKind::FullName) {
            if name.eq_ignore_ascii_case(identifier) {
                debug!("contact_card: full name of {} equals its address", identifier);
            }
        }
        self.advance(identifier, state, ItemState::Extracted);
        Ok(fields)
    }

    fn advance(&self, identifier: &str, state: &mut ItemState, next: ItemState) {
        *state = next;
        log_state(identifier, next);
    }

    /// Poll `find_token` until it resolves or the `token_located` bound passes.
    async fn locate_token(&self, identifier: &str) -> Result<B::Token, ScoutError> {
        let bound = Duration::from_millis(self.waits.token_located_ms);
        let poll = Duration::from_millis(self.waits.poll_interval_ms.max(1));
        let deadline = Instant::now() + bound;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.browser.find_token(identifier)).await {
                Ok(Ok(Some(token))) => return Ok(token),
                Ok(Ok(None)) => {}
                Ok(Err(fault)) => return Err(interaction("find_token", fault)),
                Err(_) => break,
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll.min(remaining)).await;
        }
        Err(ScoutError::NotFound(identifier.to_string()))
    }

    /// Poll the card text until it is non-empty or `popup_visible` passes.
    async fn await_card_text(&self) -> Result<String, ScoutError> {
        let bound_ms = self.waits.popup_visible_ms;
        let poll = Duration::from_millis(self.waits.poll_interval_ms.max(1));
        let deadline = Instant::now() + Duration::from_millis(bound_ms);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.browser.read_text(CaptureScope::Card)).await {
                Ok(Ok(Some(text))) if !text.trim().is_empty() => return Ok(text),
                Ok(Ok(_)) => {}
                Ok(Err(fault)) => return Err(interaction("read_text", fault)),
                Err(_) => break,
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll.min(remaining)).await;
        }
        Err(ScoutError::PopupTimeout(format!(
            "no card text after {}ms",
            bound_ms
        )))
    }

    /// Structured reads are independent; any failure leaves that kind to the
    /// pattern rules.
    async fn capture(&self, full_text: String) -> RawPopupCapture {
        let mut capture = RawPopupCapture::from_text(full_text);
        let bound = Duration::from_millis(self.waits.selector_read_ms);
        for kind in FieldKind::ALL {
            match tokio::time::timeout(bound, self.browser.read_selector(CaptureScope::Card, kind))
                .await
            {
                Ok(Ok(Some(value))) if !value.trim().is_empty() => {
                    capture.structured_values.insert(kind, value);
                }
                Ok(Ok(_)) => {}
                Ok(Err(fault)) => debug!("contact_card: selector read for {} failed: {}", kind, fault),
                Err(_) => debug!("contact_card: selector read for {} timed out", kind),
            }
        }
        capture
    }

    async fn close_all(&self, identifier: &str) {
        let bound = self.waits.close_ms;
        if let Err(e) = bounded("close_card", bound, self.browser.close_card()).await {
            warn!("contact_card: {} close_card: {}", identifier, e);
        }
        self.pacer.before_action(ActionKind::ClosePopup).await;
        if let Err(e) = bounded("close_compose", bound, self.browser.close_compose()).await {
            warn!("contact_card: {} close_compose: {}", identifier, e);
        }
    }
}

fn interaction(op: &str, fault: BrowserFault) -> ScoutError {
    ScoutError::Interaction(format!("{}: {}", op, fault))
}

async fn bounded<T, F>(op: &str, ms: u64, fut: F) -> Result<T, ScoutError>
where
    F: Future<Output = Result<T, BrowserFault>>,
{
    match tokio::time::timeout(Duration::from_millis(ms), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(fault)) => Err(interaction(op, fault)),
        Err(_) => Err(ScoutError::Interaction(format!(
            "{}: timed out after {}ms",
            op, ms
        ))),
    }
}
