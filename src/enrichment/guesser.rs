//! Stage 1: pattern-based email guessing.
//!
//! MX records are domain-level, not email-level, so the domain is
//! checked once and the best pattern applied to every contact sharing
//! it. Three phases per run:
//!
//! 1. *Learn* — reverse-detect the pattern from any lead that already
//!    has an email at the domain; zero network traffic.
//! 2. *Discover* — for domains with no learned pattern, live-probe the
//!    top-3 statistically-common candidates for one representative
//!    contact via SMTP; a deliverable hit pins the domain's pattern.
//! 3. *Default* — remaining leads get `first.last@domain`, gated only
//!    on MX existence.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::enrichment::patterns::{
    clean_person_name, generate_candidates, is_person_name, EmailPattern, DEFAULT_PATTERN,
};
use crate::utils::domain::bare_domain;

use async_trait::async_trait;
use std::time::Duration;

/// How many top candidates the discovery probe tries per domain.
const DISCOVERY_CANDIDATES: usize = 3;

pub struct PatternGuesser {
    probe_pause: Duration,
}

impl PatternGuesser {
    pub fn new(_config: &Config) -> Self {
        PatternGuesser {
            probe_pause: Duration::from_millis(500),
        }
    }

    /// Learn patterns from leads that already carry an email.
    async fn learn_from_resolved(&self, leads: &[Lead], ctx: &StageContext) -> usize {
        let mut learned = 0usize;
        for lead in leads {
            let Some(ref email) = lead.email else { continue };
            if !is_person_name(&lead.name) {
                continue;
            }
            let Some(domain) = bare_domain(&lead.website) else {
                continue;
            };
            if let Some(pattern) = EmailPattern::detect(email, &lead.name) {
                if ctx.cache.learned_pattern(&domain).await.is_none() {
                    ctx.cache.learn_pattern(&domain, pattern).await;
                    learned += 1;
                }
            }
        }
        learned
    }

    /// Probe the top candidates for one contact to discover a domain's
    /// pattern. Returns the verified address when a probe lands.
    async fn discover_domain_pattern(
        &self,
        name: &str,
        domain: &str,
        ctx: &StageContext,
    ) -> Option<String> {
        if ctx.smtp.fuse().is_tripped() {
            return None;
        }
        if ctx.probe_mx(domain).await != Some(true) {
            return None;
        }
        let mail_server = ctx.cache.mail_server(domain).await?;

        let clean = clean_person_name(name);
        let candidates: Vec<String> = generate_candidates(&clean, domain)
            .into_iter()
            .take(DISCOVERY_CANDIDATES)
            .collect();

        for candidate in candidates {
            let result = ctx
                .smtp
                .verify_with_retries(&candidate, domain, &mail_server)
                .await;
            if result.is_catch_all {
                // Acceptance proves nothing here; the catch-all stage
                // owns these domains.
                tracing::debug!(target: "guesser",
                    "{} is catch-all, aborting pattern discovery.", domain);
                return None;
            }
            if result.exists == Some(true) {
                if let Some(pattern) = EmailPattern::detect(&candidate, &clean) {
                    ctx.cache.learn_pattern(domain, pattern).await;
                    tracing::info!(target: "guesser",
                        "Discovered pattern for {}: {} (via {})", domain, pattern, candidate);
                }
                return Some(candidate);
            }
            tokio::time::sleep(self.probe_pause).await;
        }
        None
    }
}

#[async_trait]
impl EnrichmentStage for PatternGuesser {
    fn name(&self) -> &'static str {
        "pattern_guesser"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());

        // Phase 1: learn from already-resolved siblings.
        let learned = self.learn_from_resolved(leads, ctx).await;
        tracing::info!(target: "guesser", "Learned {} domain patterns from existing emails.", learned);

        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();
        let mut company_skipped = 0usize;
        let mut pattern_hits = 0usize;
        let mut discovered = 0usize;
        let mut default_hits = 0usize;
        let mut mx_rejects = 0usize;

        for (domain, indices) in groups {
            // Phase 2 (fast path): a pattern learned from a verified
            // email needs no MX check — the domain obviously accepts mail.
            let mut known_pattern = ctx.cache.learned_pattern(&domain).await;

            // Phase 1.5: discover the pattern by probing one
            // representative person at the domain.
            if known_pattern.is_none() {
                if let Some(&probe_idx) = indices
                    .iter()
                    .find(|&&i| is_person_name(&leads[i].name))
                {
                    let probe_name = leads[probe_idx].name.clone();
                    if let Some(verified) =
                        self.discover_domain_pattern(&probe_name, &domain, ctx).await
                    {
                        leads[probe_idx].assign_email(verified, EmailStatus::VerifiedBySmtp);
                        report.leads_enriched += 1;
                        discovered += 1;
                        known_pattern = ctx.cache.learned_pattern(&domain).await;
                    }
                }
            }

            if let Some(pattern) = known_pattern {
                for &idx in &indices {
                    let lead = &mut leads[idx];
                    if !lead.needs_email() {
                        continue;
                    }
                    if !is_person_name(&lead.name) {
                        company_skipped += 1;
                        continue;
                    }
                    if let Some(email) = pattern.apply(&clean_person_name(&lead.name), &domain) {
                        lead.assign_email(email, EmailStatus::PatternGuessed);
                        report.leads_enriched += 1;
                        pattern_hits += 1;
                    }
                }
                continue;
            }

            // Phase 3: no pattern known. Check MX once, then apply the
            // statistical default to everyone at the domain.
            match ctx.probe_mx(&domain).await {
                Some(true) => {
                    let mut applied_any = false;
                    for &idx in &indices {
                        let lead = &mut leads[idx];
                        if !lead.needs_email() {
                            continue;
                        }
                        if !is_person_name(&lead.name) {
                            company_skipped += 1;
                            continue;
                        }
                        if let Some(email) =
                            DEFAULT_PATTERN.apply(&clean_person_name(&lead.name), &domain)
                        {
                            lead.assign_email(email, EmailStatus::PatternGuessed);
                            report.leads_enriched += 1;
                            default_hits += 1;
                            applied_any = true;
                        }
                    }
                    // Pin the default so later guesses at this domain
                    // stay consistent with these.
                    if applied_any {
                        ctx.cache.learn_pattern(&domain, DEFAULT_PATTERN).await;
                    }
                }
                Some(false) => {
                    mx_rejects += 1;
                    tracing::debug!(target: "guesser", "{} has no MX, skipping guesses.", domain);
                }
                None => {
                    // Unknown, not absent: leave the domain for the
                    // later, more expensive stages.
                    tracing::debug!(target: "guesser", "MX for {} indeterminate, not guessing.", domain);
                }
            }
        }

        tracing::info!(target: "guesser",
            "Guesser complete: {} from learned patterns, {} patterns discovered via SMTP, \
             {} from default pattern, {} domains had no MX, {} company names skipped",
            pattern_hits, discovered, default_hits, mx_rejects, company_skipped
        );
        report
    }
}
