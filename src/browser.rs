//! WebDriver client management.
//!
//! One session per worker: a session is exclusively owned by the task
//! that created it for the duration of a page's processing and is never
//! shared across concurrent tasks.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::stealth::fingerprint::{Fingerprint, JS_OVERRIDES};
use crate::stealth::ProxyEndpoint;

use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::map::Map as JsonMap;
use std::time::Duration;

/// Creates a WebDriver client with fingerprint-derived capabilities.
pub async fn create_client(
    config: &Config,
    fingerprint: &Fingerprint,
    proxy: Option<&ProxyEndpoint>,
) -> Result<Client> {
    let webdriver_url = config
        .webdriver_url
        .as_deref()
        .ok_or_else(|| crate::core::error::AppError::Config(
            "WebDriver URL is required for browser-driven crawling.".to_string(),
        ))?;

    tracing::debug!(target: "browser", "Connecting to WebDriver at {}...", webdriver_url);

    let mut caps = JsonMap::new();
    let mut chrome_opts = JsonMap::new();

    let window_size = format!(
        "--window-size={},{}",
        fingerprint.viewport.0, fingerprint.viewport.1
    );
    let user_agent = format!("--user-agent={}", fingerprint.user_agent);
    let lang = format!("--lang={}", fingerprint.locale);

    let mut args = vec![
        "--headless=new".to_string(),
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        window_size,
        user_agent,
        lang,
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--mute-audio".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--log-level=1".to_string(),
    ];
    if let Some(proxy) = proxy {
        args.push(format!("--proxy-server={}", proxy.server));
    }
    chrome_opts.insert("args".to_string(), serde_json::json!(args));

    caps.insert("browserName".to_string(), serde_json::json!("chrome"));
    caps.insert(
        "goog:chromeOptions".to_string(),
        serde_json::json!(chrome_opts),
    );

    let mut builder = ClientBuilder::native();
    builder.capabilities(caps);

    match builder.connect(webdriver_url).await {
        Ok(client) => {
            tracing::info!(target: "browser", "WebDriver client connected successfully.");
            Ok(client)
        }
        Err(e) => {
            tracing::error!(target: "browser", "Failed to connect to WebDriver at {}: {}", webdriver_url, e);
            Err(e.into())
        }
    }
}

/// Injects the stealth JS overrides into the current page.
pub async fn apply_stealth_overrides(client: &Client) {
    if let Err(e) = client.execute(JS_OVERRIDES, vec![]).await {
        tracing::debug!(target: "browser", "Stealth override injection failed (continuing): {}", e);
    }
}

/// Navigate, let final JS run (obfuscation decoders included), and
/// return the fully-executed DOM.
pub async fn render_page(client: &Client, url: &str, settle: Duration) -> Result<String> {
    client.goto(url).await?;
    apply_stealth_overrides(client).await;
    tokio::time::sleep(settle).await;
    Ok(client.source().await?)
}

/// Collect mailto targets straight from the live DOM, catching hrefs
/// that JS assembled after load.
pub async fn dynamic_mailtos(client: &Client) -> Result<Vec<String>> {
    let value = client
        .execute(
            r#"return Array.from(document.querySelectorAll('a[href^="mailto:"]'))
                .map(a => a.href.replace('mailto:', '').split('?')[0].trim());"#,
            vec![],
        )
        .await?;
    let list: Vec<String> = serde_json::from_value(value).unwrap_or_default();
    Ok(list)
}

/// Try to click a control labeled with any of `texts` (button first,
/// then link). Returns whether anything was clicked. A missing control
/// is normal, not an error.
pub async fn click_by_text(client: &Client, texts: &[&str]) -> bool {
    for text in texts {
        let xpath = format!(
            "//button[contains(normalize-space(.), '{t}')] | //a[contains(normalize-space(.), '{t}')]",
            t = text
        );
        if let Ok(element) = client.find(Locator::XPath(&xpath)).await {
            match element.is_displayed().await {
                Ok(true) => {
                    if element.click().await.is_ok() {
                        tracing::debug!(target: "browser", "Clicked control '{}'", text);
                        return true;
                    }
                }
                _ => continue,
            }
        }
    }
    false
}

/// True when a CSS selector currently matches a displayed element.
pub async fn is_visible(client: &Client, css: &str) -> bool {
    match client.find(Locator::Css(css)).await {
        Ok(element) => element.is_displayed().await.unwrap_or(false),
        Err(_) => false,
    }
}

/// Safely closes a client session, logging any errors.
pub async fn close_client(client: Client, label: &str) {
    tracing::debug!(target: "browser", "{} Closing WebDriver client...", label);
    if let Err(e) = client.close().await {
        tracing::warn!(target: "browser", "{} Failed to close WebDriver client cleanly: {}", label, e);
    }
}
