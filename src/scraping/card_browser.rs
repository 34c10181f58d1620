//! Capability surface the item workflow drives.
//!
//! The production implementation is [`crate::scraping::owa_page::OwaPage`];
//! tests script a fake.

use crate::error::BrowserFault;
use crate::features::humanize::Pacer;
use crate::types::FieldKind;
use async_trait::async_trait;

/// Which part of the page a read looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureScope {
    /// The open contact-card popup.
    Card,
    /// The whole document.
    Page,
}

#[async_trait]
pub trait ContactCardBrowser: Send + Sync {
    /// Handle to a resolved recipient token.
    type Token: Send + Sync;

    /// Open a new compose form and wait until its recipient field is usable.
    async fn open_compose(&self, pacer: &dyn Pacer) -> Result<(), BrowserFault>;

    /// Type `text` into the recipient field and let the UI resolve it.
    async fn type_recipient(&self, text: &str, pacer: &dyn Pacer) -> Result<(), BrowserFault>;

    /// A token whose text equals `identifier` (case-insensitive), if one is shown.
    async fn find_token(&self, identifier: &str) -> Result<Option<Self::Token>, BrowserFault>;

    async fn open_card(&self, token: &Self::Token, pacer: &dyn Pacer) -> Result<(), BrowserFault>;

    /// Visible text of `scope`; `None` while it is not rendered.
    async fn read_text(&self, scope: CaptureScope) -> Result<Option<String>, BrowserFault>;

    /// Value of the first configured selector for `kind` inside `scope`.
    /// A missing element is `Ok(None)`, never an error.
    async fn read_selector(
        &self,
        scope: CaptureScope,
        kind: FieldKind,
    ) -> Result<Option<String>, BrowserFault>;

    async fn close_card(&self) -> Result<(), BrowserFault>;

    async fn close_compose(&self) -> Result<(), BrowserFault>;
}
