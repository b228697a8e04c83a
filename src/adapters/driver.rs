//! Generic pagination driver.
//!
//! Owns navigation for every adapter as a small state machine over the
//! four strategies. Extraction runs mid-pagination — after every
//! scroll round, click, and page — so partial results survive a
//! mid-run failure. A missing or invisible pagination control means
//! "exhausted", never an error; only a per-card extraction failure is
//! counted, and even that never aborts the page.

use super::{PaginationConfig, SiteAdapter, SiteConfig};
use crate::browser;
use crate::core::error::Result;
use crate::core::models::Lead;
use crate::stealth::HumanBehavior;

use chrono::Utc;
use fantoccini::{Client, Locator};
use scraper::Html;
use std::collections::HashSet;
use std::time::Duration;

/// Drives one adapter across one site, accumulating deduplicated leads.
pub struct PaginationDriver<'a> {
    adapter: &'a dyn SiteAdapter,
    config: &'a SiteConfig,
    behavior: &'a HumanBehavior,
    card_selector: scraper::Selector,
    leads: Vec<Lead>,
    seen_names: HashSet<String>,
    pub cards_failed: usize,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        adapter: &'a dyn SiteAdapter,
        config: &'a SiteConfig,
        behavior: &'a HumanBehavior,
        card_selector: scraper::Selector,
    ) -> Self {
        PaginationDriver {
            adapter,
            config,
            behavior,
            card_selector,
            leads: Vec::new(),
            seen_names: HashSet::new(),
            cards_failed: 0,
        }
    }

    /// Full pipeline for this site: navigate, settle, paginate+extract.
    /// Returns the deduplicated leads and the per-card failure count.
    pub async fn run(mut self, client: &Client) -> Result<(Vec<Lead>, usize)> {
        tracing::info!(target: "driver", "Crawling {} at {}", self.adapter.name(), self.config.url);

        client.goto(&self.config.url).await?;
        browser::apply_stealth_overrides(client).await;
        self.behavior.human_wait(false).await;

        match self.config.pagination.clone() {
            PaginationConfig::SinglePage => {
                self.extract_current(client).await;
            }
            PaginationConfig::InfiniteScroll {
                scroll_count,
                scroll_delay_ms,
                stale_rounds,
                load_indicator,
            } => {
                self.run_infinite_scroll(
                    client,
                    scroll_count,
                    Duration::from_millis(scroll_delay_ms),
                    stale_rounds,
                    load_indicator.as_deref(),
                )
                .await;
            }
            PaginationConfig::LoadMoreButton {
                button_selector,
                max_clicks,
                click_delay_ms,
            } => {
                self.run_load_more(
                    client,
                    &button_selector,
                    max_clicks,
                    Duration::from_millis(click_delay_ms),
                )
                .await;
            }
            PaginationConfig::NumberedPages {
                next_button,
                max_pages,
            } => {
                self.run_numbered_pages(client, &next_button, max_pages).await;
            }
        }

        tracing::info!(target: "driver",
            "{}: extracted {} unique leads ({} card failures)",
            self.adapter.name(), self.leads.len(), self.cards_failed
        );
        Ok((self.leads, self.cards_failed))
    }

    /// Scroll repeatedly to trigger lazy loading. Terminates on the
    /// scroll budget, or earlier when `stale_rounds` consecutive rounds
    /// produce no new unique leads — pages that endlessly re-serve the
    /// same cards cannot loop forever.
    async fn run_infinite_scroll(
        &mut self,
        client: &Client,
        scroll_count: usize,
        scroll_delay: Duration,
        stale_rounds: usize,
        load_indicator: Option<&str>,
    ) {
        let stale_rounds = stale_rounds.max(1);
        let mut stale = 0usize;

        // Whatever is visible before any scrolling counts too.
        self.extract_current(client).await;

        for round in 0..scroll_count {
            tracing::debug!(target: "driver", "Scroll round {}/{}", round + 1, scroll_count);

            if let Err(e) = self.behavior.human_scroll(client).await {
                tracing::warn!(target: "driver", "Scroll failed, stopping pagination: {}", e);
                break;
            }

            if let Some(indicator) = load_indicator {
                self.wait_for_indicator(client, indicator).await;
            }
            tokio::time::sleep(scroll_delay).await;

            let new_leads = self.extract_current(client).await;
            if new_leads == 0 {
                stale += 1;
                if stale >= stale_rounds {
                    tracing::info!(target: "driver",
                        "No new content for {} consecutive rounds, stopping scroll.", stale);
                    break;
                }
            } else {
                stale = 0;
            }
        }
    }

    /// Click the load-more control until it disappears or the click
    /// budget runs out. Extraction happens before every click so a
    /// mid-run failure keeps everything loaded so far.
    async fn run_load_more(
        &mut self,
        client: &Client,
        button_selector: &str,
        max_clicks: usize,
        click_delay: Duration,
    ) {
        self.extract_current(client).await;

        for click in 0..max_clicks {
            let button = match client.find(Locator::Css(button_selector)).await {
                Ok(el) => el,
                Err(_) => {
                    tracing::info!(target: "driver", "No more load-more control after {} clicks", click);
                    break;
                }
            };
            if !button.is_displayed().await.unwrap_or(false) {
                tracing::info!(target: "driver", "Load-more control hidden after {} clicks", click);
                break;
            }

            tracing::debug!(target: "driver", "Clicking load-more ({}/{})", click + 1, max_clicks);
            if let Err(e) = self.behavior.human_click(&button).await {
                tracing::warn!(target: "driver", "Load-more click failed, treating as exhausted: {}", e);
                break;
            }
            tokio::time::sleep(click_delay).await;
            self.extract_current(client).await;
        }
    }

    /// Follow the "next" control until absent or the page budget is
    /// exhausted.
    async fn run_numbered_pages(&mut self, client: &Client, next_button: &str, max_pages: usize) {
        for page in 0..max_pages.max(1) {
            tracing::debug!(target: "driver", "Page {}/{}", page + 1, max_pages);
            self.extract_current(client).await;

            let button = match client.find(Locator::Css(next_button)).await {
                Ok(el) => el,
                Err(_) => {
                    tracing::info!(target: "driver", "No next-page control after page {}", page + 1);
                    break;
                }
            };
            if !button.is_displayed().await.unwrap_or(false) {
                tracing::info!(target: "driver", "Next-page control hidden after page {}", page + 1);
                break;
            }
            if let Err(e) = self.behavior.human_click(&button).await {
                tracing::warn!(target: "driver", "Next-page click failed, treating as exhausted: {}", e);
                break;
            }
            self.behavior.human_wait(true).await;
        }
    }

    /// Poll for a loading indicator to appear (briefly) and disappear
    /// (bounded). Both waits are best-effort: an indicator that never
    /// shows is normal on fast pages.
    async fn wait_for_indicator(&self, client: &Client, css: &str) {
        let appear_deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < appear_deadline {
            if browser::is_visible(client, css).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let disappear_deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < disappear_deadline {
            if !browser::is_visible(client, css).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tracing::debug!(target: "driver", "Loading indicator '{}' still visible after timeout", css);
    }

    /// Parse the current DOM and feed every card to the adapter.
    /// Returns the number of new unique leads added.
    async fn extract_current(&mut self, client: &Client) -> usize {
        let source = match client.source().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(target: "driver", "Could not read page source: {}", e);
                return 0;
            }
        };
        self.extract_from_html(&source)
    }

    /// Pure-HTML extraction step, separated so it can be tested without
    /// a WebDriver session.
    pub fn extract_from_html(&mut self, source: &str) -> usize {
        let doc = Html::parse_document(source);
        let cards: Vec<_> = doc.select(&self.card_selector).collect();
        tracing::debug!(target: "driver", "Found {} cards in current page state", cards.len());

        let mut new_leads = 0usize;
        for card in cards {
            match self.adapter.parse_card(card) {
                Ok(Some(mut lead)) => {
                    if lead.name.trim().is_empty() {
                        continue;
                    }
                    let key = lead.name.trim().to_lowercase();
                    if self.seen_names.insert(key) {
                        lead.source = self.config.url.clone();
                        lead.scraped_at = Utc::now().to_rfc3339();
                        self.leads.push(lead);
                        new_leads += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.cards_failed += 1;
                    tracing::debug!(target: "driver",
                        "Card failed to parse on {} ({}): {}", self.config.url, self.adapter.name(), e);
                }
            }
        }

        tracing::debug!(target: "driver", "{} new unique leads extracted", new_leads);
        new_leads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{build_adapter, SiteConfig};

    fn openvc_config() -> SiteConfig {
        toml::from_str(
            r#"
            adapter = "openvc"
            url = "https://openvc.app/investors"
            [selectors]
            card = "div.investor"
            name = "h3"
            role = ".role"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn extraction_dedups_by_name_across_rounds() {
        let config = openvc_config();
        let adapter = build_adapter(&config).unwrap();
        let behavior = HumanBehavior::default();
        let card_selector = adapter.card_selector().clone();
        let mut driver = PaginationDriver::new(adapter.as_ref(), &config, &behavior, card_selector);

        let page1 = r#"
            <div class="investor"><h3>Jane Smith</h3><p class="role">Partner</p></div>
            <div class="investor"><h3>Bob Jones</h3><p class="role">Principal</p></div>
        "#;
        assert_eq!(driver.extract_from_html(page1), 2);

        // Same cards again plus one new: only the new one counts.
        let page2 = r#"
            <div class="investor"><h3>Jane Smith</h3><p class="role">Partner</p></div>
            <div class="investor"><h3>Bob Jones</h3><p class="role">Principal</p></div>
            <div class="investor"><h3>Alice Wong</h3><p class="role">Analyst</p></div>
        "#;
        assert_eq!(driver.extract_from_html(page2), 1);
    }

    #[test]
    fn extraction_stamps_source_and_timestamp() {
        let config = openvc_config();
        let adapter = build_adapter(&config).unwrap();
        let behavior = HumanBehavior::default();
        let card_selector = adapter.card_selector().clone();
        let mut driver = PaginationDriver::new(adapter.as_ref(), &config, &behavior, card_selector);

        driver.extract_from_html(r#"<div class="investor"><h3>Jane Smith</h3></div>"#);
        assert_eq!(driver.leads.len(), 1);
        assert_eq!(driver.leads[0].source, "https://openvc.app/investors");
        assert!(!driver.leads[0].scraped_at.is_empty());
    }
}
