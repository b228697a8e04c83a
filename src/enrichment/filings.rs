//! Stage 7: regulatory-filing search.
//!
//! The EDGAR full-text index covers Form D, ADV, and 13F filings, which
//! frequently publish direct contact addresses for fund managers. One
//! query per fund domain; results are cached and shared by every lead
//! at the domain. EDGAR's fair-use policy requires a descriptive
//! User-Agent with a contact address and modest pacing.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::matching::{take_best_match, take_exact_domain};
use crate::utils::rate_limit::HostGate;

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::time::Duration;

const EFTS_URL: &str = "https://efts.sec.gov/LATEST/search-index";

/// Forms most likely to carry manager contact emails.
const TARGET_FORMS: &str = "D,ADV,13F-HR,13F-NT";

const IGNORE_MARKERS: &[&str] = &[
    "sec.gov", "example.com", "email.com", "domain.com",
    "noreply", "no-reply", "donotreply",
];

pub struct FilingsSearch {
    gate: HostGate,
    email_re: Regex,
    user_agent: String,
    match_threshold: f32,
}

impl FilingsSearch {
    pub fn new(config: &Config) -> Self {
        FilingsSearch {
            // Fair-use allows 10 req/s; one per second is comfortably polite.
            gate: HostGate::new(Duration::from_secs(1)),
            email_re: Regex::new(r"[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}")
                .expect("static email regex"),
            user_agent: format!("lead-sleuth/0.3 ({})", config.filings_contact_email),
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

    /// Full-text search for `"@domain"` mentions in target forms.
    async fn search_filings(&self, domain: &str, ctx: &StageContext) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        self.gate.acquire("efts.sec.gov").await;

        let response = match ctx
            .http
            .get(EFTS_URL)
            .query(&[
                ("q", format!("\"@{}\"", domain).as_str()),
                ("forms", TARGET_FORMS),
                ("dateRange", "custom"),
                ("startdt", "2015-01-01"),
            ])
            .header("User-Agent", self.user_agent.clone())
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(target: "filings", "EDGAR returned {} for {}", resp.status(), domain);
                return found;
            }
            Err(e) => {
                tracing::debug!(target: "filings", "EDGAR query failed for {}: {}", domain, e);
                return found;
            }
        };

        // Emails live in excerpt/metadata fields scattered through the
        // hit payload; a regex sweep over the raw body catches them all.
        let Ok(body) = response.text().await else {
            return found;
        };
        for m in self.email_re.find_iter(&body) {
            let email = m.as_str().trim_end_matches('.').to_lowercase();
            if self.usable(&email, domain) {
                found.insert(email);
            }
        }

        if !found.is_empty() {
            tracing::info!(target: "filings",
                "Found {} filing emails for {}", found.len(), domain);
        }
        found
    }
}

#[async_trait]
impl EnrichmentStage for FilingsSearch {
    fn name(&self) -> &'static str {
        "filings_search"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            let hits = ctx
                .cache
                .module_hits_or_insert(&domain, "filings_search", || {
                    self.search_filings(&domain, ctx)
                })
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
                    tracing::info!(target: "filings", "Filing email for {}: {}", lead.name, email);
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
    fn filter_is_strictly_domain_scoped() {
        let search = FilingsSearch::new(&Config::default());
        assert!(search.usable("jane@acme.vc", "acme.vc"));
        assert!(!search.usable("jane@otherfund.com", "acme.vc"));
        assert!(!search.usable("filings@sec.gov", "acme.vc"));
        assert!(!search.usable("noreply@acme.vc", "acme.vc"));
    }

    #[test]
    fn user_agent_carries_contact_address() {
        let search = FilingsSearch::new(&Config::default());
        assert!(search.user_agent.contains('@'));
    }
}
