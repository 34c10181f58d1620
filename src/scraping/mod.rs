pub mod browser_manager;
pub mod card_browser;
pub mod owa_page;
pub mod stealth;

pub use card_browser::{CaptureScope, ContactCardBrowser};
pub use owa_page::OwaPage;
