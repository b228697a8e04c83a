//! Stage 10: deliverability verification.
//!
//! Every resolved email gets an EHLO → MAIL FROM → RCPT TO conversation
//! against its domain's mail exchanger and a three-way classification:
//! deliverable, undeliverable, or indeterminate. The conversation also
//! decides whether the domain is catch-all, in which case "deliverable"
//! is downgraded — acceptance on a catch-all domain proves nothing.
//!
//! Already-classified leads are skipped, so re-running the stage on a
//! verified set changes nothing.

use super::{EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct SmtpVerifyStage {
    semaphore: Arc<Semaphore>,
}

impl SmtpVerifyStage {
    pub fn new(config: &Config) -> Self {
        SmtpVerifyStage {
            semaphore: Arc::new(Semaphore::new(config.max_smtp_concurrency)),
        }
    }

    fn needs_verification(lead: &Lead) -> bool {
        lead.email.is_some()
            && !matches!(
                lead.email_status,
                EmailStatus::VerifiedBySmtp | EmailStatus::Undeliverable
            )
    }
}

#[async_trait]
impl EnrichmentStage for SmtpVerifyStage {
    fn name(&self) -> &'static str {
        "smtp_verify"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());

        if ctx.smtp.fuse().is_tripped() {
            tracing::info!(target: "smtp_verify",
                "SMTP disabled for this run ({}); all verdicts stay indeterminate.",
                ctx.smtp.fuse().reason().unwrap_or_default());
            report.skipped = true;
            return report;
        }

        // Group by the *email's* domain — an address mined from a
        // keyserver or commit can live on a different domain than the
        // fund website.
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, lead) in leads.iter().enumerate() {
            if !Self::needs_verification(lead) {
                continue;
            }
            if let Some(domain) = lead
                .email
                .as_deref()
                .and_then(|e| e.rsplit('@').next())
                .map(|d| d.to_lowercase())
            {
                groups.entry(domain).or_default().push(idx);
            }
        }
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            // MX once per domain; unknown is unknown, not undeliverable.
            if ctx.probe_mx(&domain).await != Some(true) {
                tracing::debug!(target: "smtp_verify",
                    "No usable MX verdict for {}, leaving {} leads indeterminate.",
                    domain, indices.len());
                continue;
            }
            let Some(mail_server) = ctx.cache.mail_server(&domain).await else {
                continue;
            };

            for idx in indices {
                let email = leads[idx].email.clone().expect("grouped on resolved email");
                let permit = self.semaphore.acquire().await.expect("semaphore never closed");
                let result = ctx
                    .smtp
                    .verify_with_retries(&email, &domain, &mail_server)
                    .await;
                drop(permit);

                if result.is_catch_all {
                    ctx.cache
                        .catch_all_or_probe(&domain, || async { Some(true) })
                        .await;
                }
                let domain_is_catch_all =
                    ctx.cache.known_catch_all(&domain).await == Some(true);

                match result.exists {
                    Some(true) if !domain_is_catch_all => {
                        leads[idx].email_status = EmailStatus::VerifiedBySmtp;
                        report.leads_enriched += 1;
                    }
                    Some(true) => {
                        // Accepted on a catch-all domain: keep the
                        // pre-verification provenance unless this very
                        // address was generated for a catch-all domain.
                        tracing::debug!(target: "smtp_verify",
                            "{} accepted but {} is catch-all; not upgrading confidence.",
                            email, domain);
                        if leads[idx].email_status == EmailStatus::PatternGuessed {
                            leads[idx].email_status = EmailStatus::CatchAllGenerated;
                        }
                    }
                    Some(false) => {
                        tracing::info!(target: "smtp_verify",
                            "{} bounced verification for {}", email, leads[idx].name);
                        leads[idx].email_status = EmailStatus::Undeliverable;
                        report.leads_enriched += 1;
                    }
                    None => {
                        // Indeterminate: timeout, greylisting, policy
                        // block. Never recorded as a negative fact.
                        tracing::debug!(target: "smtp_verify",
                            "Indeterminate verdict for {}: {}", email, result.message);
                    }
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
    fn verified_and_bounced_leads_are_not_revisited() {
        let mut verified = Lead::new("Jane Smith", "Acme", "acme.vc");
        verified.assign_email("jane@acme.vc", EmailStatus::VerifiedBySmtp);
        assert!(!SmtpVerifyStage::needs_verification(&verified));

        let mut bounced = Lead::new("Bob Jones", "Acme", "acme.vc");
        bounced.assign_email("bob@acme.vc", EmailStatus::Undeliverable);
        assert!(!SmtpVerifyStage::needs_verification(&bounced));

        let mut guessed = Lead::new("Carol White", "Acme", "acme.vc");
        guessed.assign_email("carol@acme.vc", EmailStatus::PatternGuessed);
        assert!(SmtpVerifyStage::needs_verification(&guessed));

        let unresolved = Lead::new("Dave Black", "Acme", "acme.vc");
        assert!(!SmtpVerifyStage::needs_verification(&unresolved));
    }
}
