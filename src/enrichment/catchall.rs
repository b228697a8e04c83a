//! Stage 9: catch-all detection plus rendered-DOM scraping.
//!
//! Last-resort discovery for still-unresolved domains, in two phases:
//!
//! 1. An RCPT probe with a random local part decides whether the domain
//!    accepts *any* address. On a catch-all domain every generated guess
//!    is deliverable by construction, so leads get pattern-consistent
//!    addresses tagged with the low-confidence catch-all provenance.
//! 2. Domains that are not catch-all get their candidate pages rendered
//!    in a real browser and the fully-executed DOM regex-scanned,
//!    including mailto attributes that JS assembled after load.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::browser;
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::extract::{is_junk_email, TeamPageExtractor};
use crate::crawler::matching::take_best_match;
use crate::enrichment::patterns::{clean_person_name, is_person_name, DEFAULT_PATTERN};
use crate::stealth::FingerprintManager;

use async_trait::async_trait;
use scraper::Html;
use std::collections::BTreeSet;
use std::time::Duration;

/// Candidate paths scanned during the rendered-DOM phase.
const TARGET_PATHS: &[&str] = &["/team", "/about", "/people", "/contact"];

pub struct CatchAllStage {
    extractor: TeamPageExtractor,
    match_threshold: f32,
    render_settle: Duration,
}

impl CatchAllStage {
    pub fn new(config: &Config) -> Self {
        CatchAllStage {
            extractor: TeamPageExtractor::new(&[]),
            match_threshold: config.match_threshold,
            render_settle: Duration::from_secs(1),
        }
    }

    /// Decide the domain's catch-all status, probing at most once per
    /// run. Unknown MX or a tripped SMTP fuse leave it undecided.
    async fn catch_all_verdict(&self, domain: &str, ctx: &StageContext) -> Option<bool> {
        if let Some(known) = ctx.cache.known_catch_all(domain).await {
            return Some(known);
        }
        if ctx.probe_mx(domain).await != Some(true) {
            return None;
        }
        let mail_server = ctx.cache.mail_server(domain).await?;
        ctx.cache
            .catch_all_or_probe(domain, || async {
                ctx.smtp.probe_catch_all(domain, &mail_server).await
            })
            .await
    }

    /// Generate pattern-consistent addresses for every unresolved lead
    /// at a catch-all domain.
    async fn generate_for_catch_all(
        &self,
        domain: &str,
        indices: &[usize],
        leads: &mut [Lead],
        ctx: &StageContext,
        report: &mut StageReport,
    ) {
        // A learned pattern wins so catch-all guesses agree with every
        // other guess at the domain.
        let pattern = ctx
            .cache
            .learned_pattern(domain)
            .await
            .unwrap_or(DEFAULT_PATTERN);

        for &idx in indices {
            let lead = &mut leads[idx];
            if !lead.needs_email() {
                continue;
            }
            if !is_person_name(&lead.name) {
                continue;
            }
            if let Some(email) = pattern.apply(&clean_person_name(&lead.name), domain) {
                tracing::info!(target: "catchall",
                    "Generated catch-all email for {}: {}", lead.name, email);
                lead.assign_email(email, EmailStatus::CatchAllGenerated);
                report.leads_enriched += 1;
            }
        }
    }

    /// Render the domain's candidate pages and scan the executed DOM.
    async fn scrape_rendered(
        &self,
        client: &fantoccini::Client,
        domain: &str,
        wanted: usize,
    ) -> BTreeSet<String> {
        let mut found = BTreeSet::new();

        for path in TARGET_PATHS {
            let url = format!("https://{}{}", domain, path);
            let source = match browser::render_page(client, &url, self.render_settle).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(target: "catchall", "Render failed for {}: {}", url, e);
                    continue;
                }
            };

            // Parse inside a block: the DOM handle must not be held
            // across the next await.
            let harvested = {
                let doc = Html::parse_document(&source);
                self.extractor.harvest_emails(&doc, &source)
            };
            for email in harvested {
                if !is_junk_email(&email) {
                    found.insert(email);
                }
            }
            // mailto hrefs that JS builds dynamically never appear in
            // the static source, so ask the live DOM as well.
            if let Ok(mailtos) = browser::dynamic_mailtos(client).await {
                for email in mailtos {
                    let email = email.to_lowercase();
                    if !is_junk_email(&email) {
                        found.insert(email);
                    }
                }
            }

            // Enough addresses for everyone at this domain: stop paying
            // for renders.
            if found.len() >= wanted {
                break;
            }
        }
        found
    }
}

#[async_trait]
impl EnrichmentStage for CatchAllStage {
    fn name(&self) -> &'static str {
        "catchall"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        // Phase 1: catch-all detection and generation.
        let mut render_queue: Vec<(String, Vec<usize>)> = Vec::new();
        for (domain, indices) in groups {
            match self.catch_all_verdict(&domain, ctx).await {
                Some(true) => {
                    tracing::info!(target: "catchall", "{} is catch-all", domain);
                    self.generate_for_catch_all(&domain, &indices, leads, ctx, &mut report)
                        .await;
                }
                Some(false) | None => {
                    render_queue.push((domain, indices));
                }
            }
        }

        // Phase 2: rendered-DOM scraping for whatever is left, when a
        // WebDriver endpoint is available.
        if render_queue.is_empty() {
            return report;
        }
        if ctx.config.webdriver_url.is_none() {
            tracing::info!(target: "catchall",
                "No WebDriver endpoint configured; skipping rendered-DOM scraping for {} domains.",
                render_queue.len());
            return report;
        }

        let fingerprints = FingerprintManager::new();
        let client = match browser::create_client(&ctx.config, &fingerprints.generate(), None).await
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(target: "catchall",
                    "Could not start browser session, skipping rendered scraping: {}", e);
                return report;
            }
        };

        for (domain, indices) in render_queue {
            let missing: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| leads[i].needs_email())
                .collect();
            if missing.is_empty() {
                continue;
            }

            let found = self.scrape_rendered(&client, &domain, missing.len()).await;
            if found.is_empty() {
                continue;
            }
            tracing::info!(target: "catchall",
                "Rendered DOM yielded {} emails on {}", found.len(), domain);

            let mut pool: Vec<String> = found.into_iter().collect();
            for &idx in &missing {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_best_match(&mut pool, &lead.name, self.match_threshold) {
                    tracing::info!(target: "catchall",
                        "Rendered-DOM email for {}: {}", lead.name, email);
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }
            // Leftovers are often generic (contact@, info@) but still
            // reach a mailbox at the right organization.
            for &idx in &missing {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = pool.first().cloned() {
                    pool.remove(0);
                    tracing::info!(target: "catchall",
                        "Rendered-DOM fallback email for {}: {}", lead.name, email);
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }
        }

        browser::close_client(client, "[catchall]").await;
        report
    }
}
