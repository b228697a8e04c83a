//! Stage 8: web-archive mining.
//!
//! Team pages get pruned; the Internet Archive remembers. A CDX lookup
//! per team/about path finds recent snapshots, and the archived HTML
//! goes through the same harvester as live pages, catching addresses
//! removed from the current site.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::extract::TeamPageExtractor;
use crate::crawler::matching::{take_best_match, take_exact_domain};
use crate::utils::rate_limit::HostGate;

use async_trait::async_trait;
use scraper::Html;
use std::collections::BTreeSet;
use std::time::Duration;

const CDX_URL: &str = "http://web.archive.org/cdx/search/cdx";
const SNAPSHOT_PREFIX: &str = "http://web.archive.org/web";

/// Pages most likely to have carried team emails.
const TEAM_PAGE_SUFFIXES: &[&str] = &["/team", "/about"];

const MAX_SNAPSHOTS_PER_PAGE: usize = 3;

const IGNORE_MARKERS: &[&str] = &[
    "example.com", "email.com", "domain.com",
    "noreply", "no-reply", "donotreply",
    "archive.org", "web.archive.org",
    "sentry.io", "w3.org",
];

pub struct WaybackMiner {
    gate: HostGate,
    extractor: TeamPageExtractor,
    match_threshold: f32,
}

impl WaybackMiner {
    pub fn new(config: &Config) -> Self {
        WaybackMiner {
            // Polite-use guidance for the Archive: space requests out.
            gate: HostGate::new(Duration::from_millis(1500)),
            extractor: TeamPageExtractor::new(&[]),
            match_threshold: config.match_threshold,
        }
    }

    fn usable(&self, email: &str, domain: &str) -> bool {
        let email = email.to_lowercase();
        if email.len() > 60 || email.len() < 5 {
            return false;
        }
        if IGNORE_MARKERS.iter().any(|m| email.contains(m)) {
            return false;
        }
        email.ends_with(&format!("@{}", domain))
    }

    /// Most recent snapshot timestamps for one URL.
    async fn cdx_snapshots(&self, url_pattern: &str, ctx: &StageContext) -> Vec<(String, String)> {
        self.gate.acquire("web.archive.org").await;

        let limit = format!("-{}", MAX_SNAPSHOTS_PER_PAGE);
        let response = match ctx
            .http
            .get(CDX_URL)
            .query(&[
                ("url", url_pattern),
                ("output", "json"),
                ("filter", "statuscode:200"),
                ("collapse", "digest"),
                ("limit", limit.as_str()),
                ("fl", "timestamp,original"),
            ])
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(target: "wayback", "CDX returned {} for {}", resp.status(), url_pattern);
                return Vec::new();
            }
            Err(e) => {
                tracing::debug!(target: "wayback", "CDX lookup failed for {}: {}", url_pattern, e);
                return Vec::new();
            }
        };

        // CDX json output: first row is the field header, rest are rows.
        let Ok(rows) = response.json::<Vec<Vec<String>>>().await else {
            return Vec::new();
        };
        rows.into_iter()
            .skip(1)
            .filter(|row| row.len() >= 2)
            .map(|row| (row[0].clone(), row[1].clone()))
            .collect()
    }

    /// Pull emails out of archived copies of one domain's team pages.
    async fn mine_domain(&self, domain: &str, ctx: &StageContext) -> BTreeSet<String> {
        let mut found = BTreeSet::new();

        for suffix in TEAM_PAGE_SUFFIXES {
            let pattern = format!("{}{}", domain, suffix);
            let snapshots = self.cdx_snapshots(&pattern, ctx).await;

            for (timestamp, original) in snapshots.into_iter().take(MAX_SNAPSHOTS_PER_PAGE) {
                self.gate.acquire("web.archive.org").await;
                let snapshot_url = format!("{}/{}/{}", SNAPSHOT_PREFIX, timestamp, original);

                let body = match ctx
                    .http
                    .get(&snapshot_url)
                    .timeout(Duration::from_secs(20))
                    .send()
                    .await
                {
                    Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                    Ok(_) | Err(_) => continue,
                };

                // Parse inside a block: the DOM handle must not be held
                // across the next await.
                let harvested = {
                    let doc = Html::parse_document(&body);
                    self.extractor.harvest_emails(&doc, &body)
                };
                for email in harvested {
                    if self.usable(&email, domain) {
                        found.insert(email);
                    }
                }
            }
        }

        if !found.is_empty() {
            tracing::info!(target: "wayback",
                "Archive snapshots yielded {} emails for {}", found.len(), domain);
        }
        found
    }
}

#[async_trait]
impl EnrichmentStage for WaybackMiner {
    fn name(&self) -> &'static str {
        "wayback_miner"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            let hits = ctx
                .cache
                .module_hits_or_insert(&domain, "wayback_miner", || self.mine_domain(&domain, ctx))
                .await;
            if hits.is_empty() {
                continue;
            }

            let mut pool: Vec<String> = hits.into_iter().collect();
            for &idx in &indices {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_best_match(&mut pool, &lead.name, self.match_threshold) {
                    tracing::info!(target: "wayback",
                        "Archived email for {}: {}", lead.name, email);
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }
            for &idx in &indices {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_exact_domain(&mut pool, &domain) {
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_self_references_are_ignored() {
        let miner = WaybackMiner::new(&Config::default());
        assert!(!miner.usable("info@web.archive.org", "acme.vc"));
        assert!(!miner.usable("jane@otherfund.com", "acme.vc"));
        assert!(miner.usable("jane@acme.vc", "acme.vc"));
    }
}
