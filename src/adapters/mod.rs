//! Site adapter framework.
//!
//! An adapter receives one "card" element and yields at most one lead;
//! it never manages navigation. The generic [`driver::PaginationDriver`]
//! owns navigation and pagination. Adapters are selected through a
//! closed, static registry keyed by the `adapter` field of the site
//! configuration — an unknown name is a configuration error for that
//! site only, never a run-wide failure.

pub mod angelmatch;
pub mod driver;
pub mod openvc;

pub use driver::PaginationDriver;

use crate::core::error::{AppError, ExtractionError, Result};
use crate::core::models::Lead;
use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::Deserialize;
use std::collections::HashMap;

/// Adapter names the registry knows about.
pub const REGISTERED_ADAPTERS: &[&str] = &["openvc", "angelmatch"];

/// Capability contract implemented once per directory site.
pub trait SiteAdapter: Send + Sync {
    /// Registry name of this adapter.
    fn name(&self) -> &'static str;

    /// The compiled card selector the driver feeds cards from.
    fn card_selector(&self) -> &Selector;

    /// Parse a single card into a lead.
    ///
    /// `Ok(None)` means the card is not an investor card (skip quietly);
    /// `Err` means the card looked like one but could not be parsed
    /// (logged and counted by the driver, never fatal to the page).
    fn parse_card(&self, card: ElementRef<'_>) -> std::result::Result<Option<Lead>, ExtractionError>;
}

/// Instantiate the adapter registered under `config.adapter`.
pub fn build_adapter(config: &SiteConfig) -> Result<Box<dyn SiteAdapter>> {
    match config.adapter.as_str() {
        "openvc" => Ok(Box::new(openvc::OpenVcAdapter::new(config)?)),
        "angelmatch" => Ok(Box::new(angelmatch::AngelMatchAdapter::new(config)?)),
        other => Err(AppError::Config(format!(
            "No adapter registered under '{}'. Known adapters: {}",
            other,
            REGISTERED_ADAPTERS.join(", ")
        ))),
    }
}

// ── Site configuration ───────────────────────────────────────────────

/// Top-level sites file: shared defaults plus one entry per site.
#[derive(Debug, Default, Deserialize)]
pub struct SitesFile {
    #[serde(default)]
    pub defaults: SiteDefaults,
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

impl SitesFile {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Cannot read sites config '{}': {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Invalid sites config '{}': {}", path, e)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SiteDefaults {
    #[serde(default)]
    pub screenshots: bool,
}

/// One directory site: target URL, card selectors, pagination strategy.
#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    pub adapter: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub selectors: HashMap<String, String>,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

fn default_enabled() -> bool {
    true
}

/// The four pagination strategies the driver knows how to run.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationConfig {
    #[default]
    SinglePage,
    InfiniteScroll {
        #[serde(default = "default_scroll_count")]
        scroll_count: usize,
        #[serde(default = "default_scroll_delay_ms")]
        scroll_delay_ms: u64,
        /// Consecutive rounds without new unique leads before stopping.
        #[serde(default = "default_stale_rounds")]
        stale_rounds: usize,
        #[serde(default)]
        load_indicator: Option<String>,
    },
    LoadMoreButton {
        button_selector: String,
        #[serde(default = "default_max_clicks")]
        max_clicks: usize,
        #[serde(default = "default_click_delay_ms")]
        click_delay_ms: u64,
    },
    NumberedPages {
        next_button: String,
        #[serde(default = "default_max_pages")]
        max_pages: usize,
    },
}

fn default_scroll_count() -> usize {
    10
}
fn default_scroll_delay_ms() -> u64 {
    1500
}
fn default_stale_rounds() -> usize {
    3
}
fn default_max_clicks() -> usize {
    20
}
fn default_click_delay_ms() -> u64 {
    2000
}
fn default_max_pages() -> usize {
    20
}

// ── Selector utilities shared by adapters ────────────────────────────

/// Pre-parsed card selectors for one site. Parsing happens once at
/// adapter construction so a bad selector is a startup configuration
/// error for that site, not a per-card surprise.
pub struct CardSelectors {
    pub card: Selector,
    named: HashMap<String, Selector>,
    email_re: Regex,
}

impl CardSelectors {
    /// `required` names must be present in the config; the rest are
    /// looked up lazily and simply yield `N/A`-style defaults.
    pub fn compile(config: &SiteConfig, required: &[&str]) -> Result<Self> {
        let card_css = config.selectors.get("card").cloned().unwrap_or_else(|| "div".to_string());
        let card = Selector::parse(&card_css).map_err(|_| {
            AppError::Config(format!("Invalid card selector '{}' for {}", card_css, config.adapter))
        })?;

        for name in required {
            if !config.selectors.contains_key(*name) {
                return Err(AppError::Config(format!(
                    "Site '{}' is missing required selector '{}'",
                    config.adapter, name
                )));
            }
        }

        let mut named = HashMap::new();
        for (name, css) in &config.selectors {
            if name == "card" {
                continue;
            }
            let sel = Selector::parse(css).map_err(|_| {
                AppError::Config(format!(
                    "Invalid selector '{}' ({}) for {}",
                    css, name, config.adapter
                ))
            })?;
            named.insert(name.clone(), sel);
        }

        Ok(CardSelectors {
            card,
            named,
            email_re: Regex::new(r"[\w.+\-']+@[\w-]+\.[\w.-]+").expect("static email regex"),
        })
    }

    /// Text of the first match, if any.
    pub fn text(&self, card: ElementRef<'_>, name: &str) -> Option<String> {
        let sel = self.named.get(name)?;
        let el = card.select(sel).next()?;
        let text = el
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Attribute of the first match, if any.
    pub fn attr(&self, card: ElementRef<'_>, name: &str, attr: &str) -> Option<String> {
        let sel = self.named.get(name)?;
        let el = card.select(sel).next()?;
        el.value().attr(attr).map(|s| s.to_string())
    }

    /// Text of every match.
    pub fn list(&self, card: ElementRef<'_>, name: &str) -> Vec<String> {
        let Some(sel) = self.named.get(name) else {
            return Vec::new();
        };
        card.select(sel)
            .map(|el| {
                el.text()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Multi-strategy email extraction for one card: a mailto link under
    /// the configured selector first, then an address anywhere in the
    /// card's text.
    pub fn email(&self, card: ElementRef<'_>) -> Option<String> {
        if let Some(href) = self.attr(card, "email", "href") {
            if let Some(rest) = href.strip_prefix("mailto:") {
                let email = rest.split('?').next().unwrap_or("").trim();
                if !email.is_empty() {
                    return Some(email.to_lowercase());
                }
            }
        }

        let text = card
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.contains('@') {
            if let Some(m) = self.email_re.find(&text) {
                return Some(m.as_str().to_lowercase());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_config(toml_str: &str) -> SiteConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn pagination_config_parses_all_strategies() {
        let config = site_config(
            r#"
            adapter = "openvc"
            url = "https://openvc.app/investors"
            [pagination]
            type = "infinite_scroll"
            scroll_count = 5
            stale_rounds = 2
            load_indicator = ".spinner"
            "#,
        );
        match config.pagination {
            PaginationConfig::InfiniteScroll {
                scroll_count,
                stale_rounds,
                ref load_indicator,
                ..
            } => {
                assert_eq!(scroll_count, 5);
                assert_eq!(stale_rounds, 2);
                assert_eq!(load_indicator.as_deref(), Some(".spinner"));
            }
            _ => panic!("expected infinite scroll"),
        }

        let config = site_config(
            r#"
            adapter = "angelmatch"
            url = "https://angelmatch.io/investors"
            [pagination]
            type = "load_more_button"
            button_selector = "button.load-more"
            "#,
        );
        assert!(matches!(
            config.pagination,
            PaginationConfig::LoadMoreButton { ref button_selector, max_clicks: 20, .. }
                if button_selector == "button.load-more"
        ));

        let config = site_config(
            r#"
            adapter = "openvc"
            url = "https://example.com"
            "#,
        );
        assert!(matches!(config.pagination, PaginationConfig::SinglePage));
    }

    #[test]
    fn unknown_adapter_is_a_config_error() {
        let config = site_config(
            r#"
            adapter = "crunchbase"
            url = "https://example.com"
            "#,
        );
        let err = match build_adapter(&config) {
            Ok(_) => panic!("expected a config error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("crunchbase"));
    }

    #[test]
    fn missing_required_selector_is_a_config_error() {
        let config = site_config(
            r#"
            adapter = "openvc"
            url = "https://example.com"
            [selectors]
            card = "div.card"
            "#,
        );
        // openvc requires a name selector
        assert!(build_adapter(&config).is_err());
    }

    #[test]
    fn invalid_selector_is_a_config_error() {
        let config = site_config(
            r#"
            adapter = "openvc"
            url = "https://example.com"
            [selectors]
            card = "div.card"
            name = ":::nope"
            "#,
        );
        assert!(build_adapter(&config).is_err());
    }
}
