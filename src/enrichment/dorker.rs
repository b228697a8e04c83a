//! Stage 3: search-engine dorking.
//!
//! Targeted quoted-domain queries surface addresses leaked on third
//! party sites: conference programs, press releases, cached pages. The
//! primary path scrapes the result page directly; a captcha wall or
//! hard rate limit trips the subsystem fuse for the run, after which
//! only the paid SerpAPI fallback (when configured) keeps running.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::matching::{take_best_match, take_exact_domain};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::Semaphore;

const RESULTS_PER_QUERY: usize = 10;

const SEARCH_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
];

/// Result-page noise that is never a lead's address.
const SKIP_DOMAINS: &[&str] = &[
    "example.com", "email.com", "domain.com", "sentry.io",
    "wixpress.com", "w3.org", "schema.org", "googleapis.com",
    "google.com", "gstatic.com", "googleusercontent.com",
    "facebook.com", "twitter.com", "github.com",
];

pub struct SearchDorker {
    semaphore: Semaphore,
    email_re: Regex,
    match_threshold: f32,
    serpapi_key: Option<String>,
}

impl SearchDorker {
    pub fn new(config: &Config) -> Self {
        SearchDorker {
            semaphore: Semaphore::new(3),
            email_re: Regex::new(r"[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}")
                .expect("static email regex"),
            match_threshold: config.match_threshold,
            serpapi_key: config.serpapi_key.clone(),
        }
    }

    fn extract_emails(&self, text: &str, found: &mut BTreeSet<String>) {
        for m in self.email_re.find_iter(text) {
            let email = m.as_str().trim_end_matches('.').to_lowercase();
            let Some(domain) = email.rsplit('@').next() else { continue };
            if SKIP_DOMAINS.contains(&domain) {
                continue;
            }
            if [".png", ".jpg", ".svg", ".gif", ".css", ".js"]
                .iter()
                .any(|ext| email.contains(ext))
            {
                continue;
            }
            if email.len() > 60 || email.len() < 5 {
                continue;
            }
            found.insert(email);
        }
    }

    /// Primary path: fetch the result page for one dork query.
    async fn engine_search(
        &self,
        query: &str,
        ctx: &StageContext,
        report: &mut StageReport,
    ) -> Option<String> {
        if ctx.dork_fuse.is_tripped() {
            return None;
        }
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let url = format!(
            "https://www.google.com/search?q={}&num={}",
            urlencode(query),
            RESULTS_PER_QUERY
        );
        let user_agent = *SEARCH_USER_AGENTS
            .choose(&mut rand::thread_rng())
            .expect("non-empty list");

        let response = ctx
            .http
            .get(&url)
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().as_u16() == 429 => {
                report.rate_limited += 1;
                ctx.dork_fuse
                    .trip("search engine returned 429 (hard rate limit)");
                None
            }
            Ok(resp) if resp.status().is_success() => {
                let body = resp.text().await.ok()?;
                if body.contains("detected unusual traffic") || body.contains("/sorry/") {
                    report.rate_limited += 1;
                    ctx.dork_fuse.trip("search engine served a captcha wall");
                    return None;
                }
                Some(body)
            }
            Ok(resp) => {
                tracing::debug!(target: "dorker", "Search returned status {}", resp.status());
                None
            }
            Err(e) => {
                tracing::debug!(target: "dorker", "Search request failed: {}", e);
                None
            }
        }
    }

    /// Paid fallback via SerpAPI.
    async fn serpapi_search(&self, query: &str, ctx: &StageContext) -> Option<String> {
        let key = self.serpapi_key.as_deref()?;
        let num = RESULTS_PER_QUERY.to_string();
        let response = ctx
            .http
            .get("https://serpapi.com/search.json")
            .query(&[
                ("q", query),
                ("api_key", key),
                ("num", num.as_str()),
                ("engine", "google"),
            ])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let payload: serde_json::Value = response.json().await.ok()?;
        let mut text = String::new();
        if let Some(results) = payload.get("organic_results").and_then(|v| v.as_array()) {
            for result in results {
                for field in ["title", "snippet", "link"] {
                    if let Some(value) = result.get(field).and_then(|v| v.as_str()) {
                        text.push_str(value);
                        text.push(' ');
                    }
                }
            }
        }
        Some(text)
    }

    async fn search_domain(
        &self,
        domain: &str,
        ctx: &StageContext,
        report: &mut StageReport,
    ) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let queries = [
            format!("\"@{}\"", domain),
            format!("site:{} email", domain),
        ];

        for query in &queries {
            let body = match self.engine_search(query, ctx, report).await {
                Some(body) => Some(body),
                None => self.serpapi_search(query, ctx).await,
            };
            if let Some(body) = body {
                self.extract_emails(&body, &mut found);
            }
            // Jittered pause between dork queries
            let pause = rand::thread_rng().gen_range(2.0..4.0);
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }

        if !found.is_empty() {
            tracing::info!(target: "dorker", "Found {} emails for {}", found.len(), domain);
        }
        found
    }
}

#[async_trait]
impl EnrichmentStage for SearchDorker {
    fn name(&self) -> &'static str {
        "search_dorker"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());

        if ctx.dork_fuse.is_tripped() && self.serpapi_key.is_none() {
            tracing::info!(target: "dorker", "Search subsystem disabled and no fallback key; skipping.");
            report.skipped = true;
            return report;
        }

        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            // One search per domain per run; hits are shared through the cache.
            let cached = ctx.cache.entry(&domain);
            let hits = {
                let mut record = cached.lock().await;
                if let Some(existing) = record.module_hits.get("search_dorker") {
                    existing.clone()
                } else {
                    let fresh = self.search_domain(&domain, ctx, &mut report).await;
                    record.module_hits.insert("search_dorker", fresh.clone());
                    fresh
                }
            };
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
                    tracing::info!(target: "dorker", "Dorked email for {}: {}", lead.name, email);
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

/// Minimal query-string encoding for search terms.
fn urlencode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_skips_search_result_noise() {
        let dorker = SearchDorker::new(&Config::default());
        let mut found = BTreeSet::new();
        dorker.extract_emails(
            "contact jane.smith@acme.vc or maps@google.com and track@sentry.io plus icon.png@2x.css",
            &mut found,
        );
        assert_eq!(found.len(), 1);
        assert!(found.contains("jane.smith@acme.vc"));
    }

    #[test]
    fn urlencode_escapes_quotes_and_at() {
        assert_eq!(urlencode("\"@acme.vc\""), "%22%40acme%2Evc%22");
    }
}
