//! Stage 2: DNS record harvesting.
//!
//! SPF TXT records, DMARC rua/ruf reporting URIs, and SOA rname fields
//! routinely embed administrative or founder addresses. Zero-cost and
//! instant compared to everything downstream.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::crawler::matching::{take_best_match, take_exact_domain};
use crate::utils::dns::{soa_rname_email, txt_record_text};

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use tokio::sync::Semaphore;

/// Addresses belonging to DMARC aggregators and generic reporting
/// mailboxes; harvesting them would enrich nobody.
const IGNORE_MARKERS: &[&str] = &[
    "example.com", "email.com", "domain.com",
    "noreply", "no-reply", "donotreply",
    "postmaster", "hostmaster", "webmaster", "abuse",
    "sentry.io",
    "agari.com",
    "dmarcian.com",
    "mimecast.com",
    "rua@dmarc.",
    "rejection@",
];

pub struct DnsHarvester {
    semaphore: Semaphore,
    email_re: Regex,
    match_threshold: f32,
}

impl DnsHarvester {
    pub fn new(config: &Config) -> Self {
        DnsHarvester {
            // DNS is fast; high fan-out is safe.
            semaphore: Semaphore::new(50),
            email_re: Regex::new(r"[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}")
                .expect("static email regex"),
            match_threshold: config.match_threshold,
        }
    }

    fn usable(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        if email.len() > 60 || email.len() < 5 {
            return false;
        }
        !IGNORE_MARKERS.iter().any(|m| email.contains(m))
    }

    /// Query TXT, `_dmarc.` TXT, and SOA for one domain and pull out
    /// every plausible address.
    async fn harvest_domain(&self, domain: &str, ctx: &StageContext) -> BTreeSet<String> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let dmarc_domain = format!("_dmarc.{}", domain);
        let (txt, dmarc, soa) = tokio::join!(
            txt_record_text(&ctx.resolver, domain),
            txt_record_text(&ctx.resolver, &dmarc_domain),
            soa_rname_email(&ctx.resolver, domain),
        );

        // DMARC URIs carry mailto: prefixes
        let combined = format!("{} {} {}", txt, dmarc, soa.unwrap_or_default()).replace("mailto:", " ");

        let mut found = BTreeSet::new();
        for m in self.email_re.find_iter(&combined) {
            let email = m.as_str().trim_end_matches('.').to_lowercase();
            if self.usable(&email) {
                found.insert(email);
            }
        }
        if !found.is_empty() {
            tracing::info!(target: "dns_harvest", "Found {} emails for {}", found.len(), domain);
        }
        found
    }
}

#[async_trait]
impl EnrichmentStage for DnsHarvester {
    fn name(&self) -> &'static str {
        "dns_harvest"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            let hits = ctx
                .cache
                .module_hits_or_insert(&domain, "dns_harvest", || self.harvest_domain(&domain, ctx))
                .await;
            if hits.is_empty() {
                continue;
            }

            let mut pool: Vec<String> = hits.into_iter().collect();

            // First pass: name-specific matches.
            for &idx in &indices {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_best_match(&mut pool, &lead.name, self.match_threshold) {
                    tracing::info!(target: "dns_harvest",
                        "DNS-harvested email for {}: {}", lead.name, email);
                    lead.assign_email(email, EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }
            }

            // Second pass: DNS emails are often generic (admin@, ops@).
            // Distribute leftovers as fallbacks, but only ones exactly at
            // the target domain — never a third-party reporting service.
            for &idx in &indices {
                let lead = &mut leads[idx];
                if !lead.needs_email() {
                    continue;
                }
                if let Some(email) = take_exact_domain(&mut pool, &domain) {
                    tracing::info!(target: "dns_harvest",
                        "DNS strict-fallback email for {}: {}", lead.name, email);
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
    fn reporting_service_addresses_are_ignored() {
        let harvester = DnsHarvester::new(&Config::default());
        assert!(!harvester.usable("rua@dmarc.acme.vc"));
        assert!(!harvester.usable("reports@dmarcian.com"));
        assert!(!harvester.usable("postmaster@acme.vc"));
        assert!(harvester.usable("jane@acme.vc"));
        assert!(harvester.usable("ops@acme.vc"));
    }
}
