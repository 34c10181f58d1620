//! [`ContactCardBrowser`] over a live Outlook-on-the-web page.
//!
//! DOM reads go through small JSON-returning scripts so a missing node is
//! `null` instead of a CDP error. Clicks travel along the pacer's pointer path;
//! typing dispatches one `char` key event per character at the pacer's cadence.

use crate::config::{Selectors, WaitTimes};
use crate::error::BrowserFault;
use crate::extraction::clean_structured_value;
use crate::features::humanize::{Pacer, PointerPoint};
use crate::scraping::card_browser::{CaptureScope, ContactCardBrowser};
use crate::types::FieldKind;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::element::Element;
use chromiumoxide::layout::Point;
use chromiumoxide::Page;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A recipient token as seen when it was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientToken {
    /// Position among the nodes matching `selectors.recipient_token`.
    pub index: usize,
    pub text: String,
}

pub struct OwaPage {
    page: Page,
    selectors: Selectors,
    waits: WaitTimes,
    pointer: Mutex<PointerPoint>,
}

fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl OwaPage {
    pub fn new(page: Page, selectors: Selectors, waits: WaitTimes) -> Self {
        Self {
            page,
            selectors,
            waits,
            pointer: Mutex::new(PointerPoint::new(0.0, 0.0)),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Evaluate a script that returns `JSON.stringify(...)` and parse it.
    async fn eval_json(&self, script: String) -> Result<serde_json::Value, BrowserFault> {
        let raw: String = self
            .page
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|e| BrowserFault::Protocol(format!("unexpected script result: {}", e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| BrowserFault::Protocol(format!("unparseable script result: {}", e)))
    }

    async fn wait_for(&self, selector: &str, within_ms: u64) -> Result<Element, BrowserFault> {
        let deadline = Instant::now() + Duration::from_millis(within_ms);
        let poll = Duration::from_millis(self.waits.poll_interval_ms.max(1));
        loop {
            if let Ok(el) = self.page.find_element(selector).await {
                return Ok(el);
            }
            if Instant::now() >= deadline {
                return Err(BrowserFault::Timeout(format!(
                    "'{}' not present after {}ms",
                    selector, within_ms
                )));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Move the pointer along the pacer's path to `element` and click where the
    /// path ends.
    async fn human_click(&self, element: &Element, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        element.scroll_into_view().await?;
        let target = element.clickable_point().await?;
        let start = *self.pointer.lock().unwrap_or_else(|e| e.into_inner());

        let path = pacer.motion_path(start, PointerPoint::new(target.x, target.y));
        let step = pacer
            .motion_duration()
            .checked_div(path.len().max(1) as u32)
            .unwrap_or_default();
        for p in &path {
            self.page.move_mouse(Point::new(p.x, p.y)).await?;
            if !step.is_zero() {
                tokio::time::sleep(step).await;
            }
        }

        let end = path.last().copied().unwrap_or(PointerPoint::new(target.x, target.y));
        self.page.click(Point::new(end.x, end.y)).await?;
        *self.pointer.lock().unwrap_or_else(|e| e.into_inner()) = end;
        Ok(())
    }

    async fn press_key(&self, key: &str, code: &str, key_code: i64) -> Result<(), BrowserFault> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key.to_string())
                .code(code.to_string())
                .windows_virtual_key_code(key_code)
                .native_virtual_key_code(key_code)
                .build()
                .map_err(BrowserFault::Protocol)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    async fn type_chars(&self, text: &str, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        for ch in text.chars() {
            let delay = pacer.keystroke_delay(ch);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(BrowserFault::Protocol)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    fn scope_root(&self, scope: CaptureScope) -> String {
        match scope {
            CaptureScope::Card => format!("document.querySelector({})", js_str(&self.selectors.popup)),
            CaptureScope::Page => "document.body".to_string(),
        }
    }
}

#[async_trait]
impl ContactCardBrowser for OwaPage {
    type Token = RecipientToken;

    async fn open_compose(&self, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        let button = self
            .wait_for(&self.selectors.new_message, self.waits.compose_ready_ms)
            .await?;
        self.human_click(&button, pacer).await?;
        self.wait_for(&self.selectors.recipient_field, self.waits.compose_ready_ms)
            .await?;
        Ok(())
    }

    async fn type_recipient(&self, text: &str, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        let field = self
            .wait_for(&self.selectors.recipient_field, self.waits.compose_ready_ms)
            .await?;
        self.human_click(&field, pacer).await?;
        self.type_chars(text, pacer).await?;

        // leaving the field turns the typed text into a resolved token
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (el) el.blur(); return JSON.stringify(!!el); }})()",
            js_str(&self.selectors.recipient_field)
        );
        self.eval_json(script).await?;
        Ok(())
    }

    async fn find_token(&self, identifier: &str) -> Result<Option<RecipientToken>, BrowserFault> {
        let script = format!(
            r#"(() => {{
    const want = {want}.trim().toLowerCase();
    const nodes = Array.from(document.querySelectorAll({sel}));
    const idx = nodes.findIndex(n => (n.innerText || '').trim().toLowerCase() === want);
    return JSON.stringify(idx < 0 ? null : {{ index: idx, text: (nodes[idx].innerText || '').trim() }});
}})()"#,
            want = js_str(identifier),
            sel = js_str(&self.selectors.recipient_token)
        );
        let found = self.eval_json(script).await?;
        let Some(index) = found.get("index").and_then(|v| v.as_u64()) else {
            return Ok(None);
        };
        let text = found
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or(identifier)
            .to_string();
        Ok(Some(RecipientToken {
            index: index as usize,
            text,
        }))
    }

    async fn open_card(&self, token: &RecipientToken, pacer: &dyn Pacer) -> Result<(), BrowserFault> {
        let nodes = self.page.find_elements(&self.selectors.recipient_token).await?;
        let Some(node) = nodes.get(token.index) else {
            return Err(BrowserFault::Detached(format!(
                "token '{}' no longer at position {}",
                token.text, token.index
            )));
        };
        let current = node.inner_text().await?.unwrap_or_default();
        if !current.trim().eq_ignore_ascii_case(&token.text) {
            return Err(BrowserFault::Detached(format!(
                "token '{}' was replaced by '{}'",
                token.text,
                current.trim()
            )));
        }
        self.human_click(node, pacer).await
    }

    async fn read_text(&self, scope: CaptureScope) -> Result<Option<String>, BrowserFault> {
        let script = format!(
            "(() => {{ const root = {}; return JSON.stringify(root ? (root.innerText || '') : null); }})()",
            self.scope_root(scope)
        );
        let value = self.eval_json(script).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn read_selector(
        &self,
        scope: CaptureScope,
        kind: FieldKind,
    ) -> Result<Option<String>, BrowserFault> {
        let Some(candidates) = self.selectors.fields.get(&kind) else {
            return Ok(None);
        };
        for selector in candidates {
            let script = format!(
                r#"(() => {{
    const root = {root};
    if (!root) return JSON.stringify(null);
    const el = root.querySelector({sel});
    if (!el) return JSON.stringify(null);
    return JSON.stringify((el.innerText || el.textContent || el.getAttribute('href') || '').trim());
}})()"#,
                root = self.scope_root(scope),
                sel = js_str(selector)
            );
            match self.eval_json(script).await {
                Ok(serde_json::Value::String(raw)) => {
                    if let Some(value) = clean_structured_value(kind, &raw) {
                        debug!("owa_page: {} <- '{}' via {}", kind, value, selector);
                        return Ok(Some(value));
                    }
                }
                Ok(_) => {}
                // an invalid selector only disqualifies itself
                Err(e) => debug!("owa_page: selector {} for {} failed: {}", selector, kind, e),
            }
        }
        Ok(None)
    }

    async fn close_card(&self) -> Result<(), BrowserFault> {
        self.press_key("Escape", "Escape", 27).await
    }

    async fn close_compose(&self) -> Result<(), BrowserFault> {
        let discard = self
            .wait_for(&self.selectors.discard, self.waits.close_ms / 2)
            .await?;
        discard.click().await?;
        tokio::time::sleep(Duration::from_millis(self.waits.close_ms / 6)).await;
        // the confirmation dialog reuses the same button label
        if let Ok(confirm) = self.page.find_element(&self.selectors.discard).await {
            if let Err(e) = confirm.click().await {
                warn!("owa_page: discard confirmation click failed: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_literals_are_escaped() {
        assert_eq!(js_str(r#"button[title="Nuevo"]"#), r#""button[title=\"Nuevo\"]""#);
        assert_eq!(js_str("it's"), r#""it's""#);
    }
}
