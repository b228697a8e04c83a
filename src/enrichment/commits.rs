//! Stage 6: commit-metadata mining.
//!
//! Plenty of investors contribute to open source, and their commits
//! carry a real work address in the author field. The commit-search
//! index is queried by domain-scoped author email first (one query
//! covers the whole organization), then by author name for the few
//! leads still unresolved.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::matching::take_best_match;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::Semaphore;

const API_BASE: &str = "https://api.github.com";

/// Gap between commit-search calls, independent of the HTTP timeout.
const REQUEST_PAUSE: Duration = Duration::from_millis(500);

/// Per-domain cap on the expensive per-person name searches.
const NAME_SEARCHES_PER_DOMAIN: usize = 5;

const IGNORE_EMAIL_DOMAINS: &[&str] = &[
    "noreply.github.com",
    "users.noreply.github.com",
    "github.com",
    "localhost",
    "example.com",
];

pub struct CommitMiner {
    semaphore: Semaphore,
    token: Option<String>,
    match_threshold: f32,
}

impl CommitMiner {
    pub fn new(config: &Config) -> Self {
        CommitMiner {
            semaphore: Semaphore::new(10),
            token: config.github_token.clone(),
            match_threshold: config.match_threshold,
        }
    }

    fn valid_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        if !email.contains('@') || email.len() > 60 || email.len() < 5 {
            return false;
        }
        let domain = email.rsplit('@').next().unwrap_or("");
        if IGNORE_EMAIL_DOMAINS.contains(&domain) {
            return false;
        }
        !email.contains("noreply") && !email.contains("bot")
    }

    /// One commit-search call with auth, rate-limit, and validation
    /// handling. 403 honors Retry-After as a transient failure within
    /// this stage only.
    async fn api_search(
        &self,
        query: &str,
        per_page: usize,
        ctx: &StageContext,
        report: &mut StageReport,
    ) -> Option<serde_json::Value> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let per_page = per_page.to_string();
        let mut request = ctx
            .http
            .get(format!("{}/search/commits", API_BASE))
            .query(&[
                ("q", query),
                ("per_page", per_page.as_str()),
                ("sort", "author-date"),
                ("order", "desc"),
            ])
            // Commit search requires the cloak preview media type
            .header("Accept", "application/vnd.github.cloak-preview+json")
            .timeout(Duration::from_secs(15));
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("token {}", token));
        }

        match request.send().await {
            Ok(resp) if resp.status().as_u16() == 403 => {
                report.rate_limited += 1;
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60)
                    .min(120);
                tracing::warn!(target: "commit_miner",
                    "Commit search rate-limited, waiting {}s...", retry_after);
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                None
            }
            // 422 = query rejected (too broad); not retriable
            Ok(resp) if resp.status().as_u16() == 422 => None,
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                tracing::debug!(target: "commit_miner", "Commit search returned {}", resp.status());
                None
            }
            Err(e) => {
                tracing::debug!(target: "commit_miner", "Commit search failed: {}", e);
                None
            }
        }
    }

    fn author_emails(&self, payload: &serde_json::Value) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if let Some(items) = payload.get("items").and_then(|v| v.as_array()) {
            for item in items {
                let email = item
                    .pointer("/commit/author/email")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if self.valid_email(email) {
                    found.insert(email.to_lowercase());
                }
            }
        }
        found
    }

    /// Domain-wide sweep: every commit authored from an @domain address.
    async fn search_domain(
        &self,
        domain: &str,
        ctx: &StageContext,
        report: &mut StageReport,
    ) -> BTreeSet<String> {
        let query = format!("author-email:@{}", domain);
        let mut found = BTreeSet::new();
        if let Some(payload) = self.api_search(&query, 30, ctx, report).await {
            for email in self.author_emails(&payload) {
                if email.ends_with(&format!("@{}", domain)) {
                    found.insert(email);
                }
            }
        }
        if !found.is_empty() {
            tracing::info!(target: "commit_miner", "Found {} emails for {}", found.len(), domain);
        }
        tokio::time::sleep(REQUEST_PAUSE).await;
        found
    }

    /// Targeted search by author display name, filtered to the domain.
    async fn search_by_name(
        &self,
        name: &str,
        domain: &str,
        ctx: &StageContext,
        report: &mut StageReport,
    ) -> Option<String> {
        let query = format!("author-name:\"{}\"", name);
        let payload = self.api_search(&query, 5, ctx, report).await?;
        let suffix = format!("@{}", domain);
        let result = self
            .author_emails(&payload)
            .into_iter()
            .find(|email| email.ends_with(&suffix));
        tokio::time::sleep(REQUEST_PAUSE).await;
        result
    }
}

#[async_trait]
impl EnrichmentStage for CommitMiner {
    fn name(&self) -> &'static str {
        "commit_miner"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());

        if self.token.is_none() {
            tracing::warn!(target: "commit_miner",
                "No API token configured; commit search runs at the anonymous 60 req/hr budget.");
        }

        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            // Phase 1: domain-wide sweep, cached and fuzzy-matched back.
            let hits = {
                let entry = ctx.cache.entry(&domain);
                let mut record = entry.lock().await;
                if let Some(existing) = record.module_hits.get("commit_miner") {
                    existing.clone()
                } else {
                    let fresh = self.search_domain(&domain, ctx, &mut report).await;
                    record.module_hits.insert("commit_miner", fresh.clone());
                    fresh
                }
            };

            let mut pool: Vec<String> = hits.into_iter().collect();
            for &idx in &indices {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_best_match(&mut pool, &lead.name, self.match_threshold) {
                    tracing::info!(target: "commit_miner",
                        "Commit email for {}: {}", lead.name, email);
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }

            // Phase 2: per-person search for a bounded number of leftovers.
            let still_missing: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| leads[i].needs_email())
                .take(NAME_SEARCHES_PER_DOMAIN)
                .collect();
            for idx in still_missing {
                let name = leads[idx].name.clone();
                if let Some(email) = self.search_by_name(&name, &domain, ctx, &mut report).await {
                    tracing::info!(target: "commit_miner", "Commit email for {}: {}", name, email);
                    leads[idx].assign_email(email, EmailStatus::ScrapedFromPage);
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
    fn privacy_addresses_are_rejected() {
        let miner = CommitMiner::new(&Config::default());
        assert!(!miner.valid_email("12345+jane@users.noreply.github.com"));
        assert!(!miner.valid_email("dependabot-bot@acme.vc"));
        assert!(miner.valid_email("jane@acme.vc"));
    }

    #[test]
    fn author_emails_parsed_from_search_payload() {
        let miner = CommitMiner::new(&Config::default());
        let payload = serde_json::json!({
            "items": [
                {"commit": {"author": {"name": "Jane Smith", "email": "jane@acme.vc"}}},
                {"commit": {"author": {"name": "Bot", "email": "x@users.noreply.github.com"}}},
            ]
        });
        let emails = miner.author_emails(&payload);
        assert_eq!(emails.len(), 1);
        assert!(emails.contains("jane@acme.vc"));
    }
}
