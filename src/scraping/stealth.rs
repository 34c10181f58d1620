//! Page-level stealth: a script evaluated on every new document before the
//! webmail's own scripts run.

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use tracing::info;

/// Navigator languages reported to the page; the webmail UI is Spanish.
pub const DEFAULT_LANGUAGES: &[&str] = &["es-ES", "es", "en-US", "en"];

/// Build the stealth script for the given navigator languages.
pub fn stealth_script(languages: &[&str]) -> String {
    let langs = serde_json::to_string(languages).unwrap_or_else(|_| "[\"en-US\"]".to_string());
    format!(
        r#"
(() => {{
    const proto = Navigator.prototype;
    try {{
        Object.defineProperty(proto, 'webdriver', {{ get: () => undefined, configurable: true }});
    }} catch (e) {{}}
    try {{ delete navigator.webdriver; }} catch (e) {{}}
    try {{
        Object.defineProperty(proto, 'languages', {{ get: () => {langs}, configurable: true }});
    }} catch (e) {{}}
    try {{
        Object.defineProperty(proto, 'plugins', {{ get: () => [1, 2, 3, 4, 5], configurable: true }});
    }} catch (e) {{}}
}})();

if (!window.chrome) {{ window.chrome = {{}}; }}
if (!window.chrome.runtime) {{
    window.chrome.runtime = {{
        connect: function() {{ return {{ onDisconnect: {{ addListener: function() {{}} }} }}; }},
        sendMessage: function() {{}},
    }};
}}

const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {{
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({{ state: Notification.permission }})
            : originalQuery(parameters)
    );
}}

const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function(parameter) {{
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return getParameter.apply(this, arguments);
}};

delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
"#,
        langs = langs
    )
}

/// Register the stealth script on `page`. Call before the first navigation.
pub async fn inject_stealth(page: &Page) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(stealth_script(
        DEFAULT_LANGUAGES,
    )))
    .await
    .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;
    info!("stealth: 💉 navigator hardening registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_embeds_languages_as_json() {
        let js = stealth_script(&["es-ES", "es"]);
        assert!(js.contains(r#"get: () => ["es-ES","es"]"#));
        assert!(js.contains("webdriver"));
        assert!(!js.contains("{{"));
    }
}
