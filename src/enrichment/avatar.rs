//! Stage 4: avatar-oracle confirmation.
//!
//! Gravatar and Libravatar map email → avatar through an MD5 hash, and
//! `?d=404` makes them answer 404 for unregistered addresses and 200
//! for registered ones. Because Gravatar underpins WordPress, GitHub,
//! Slack and hundreds of other services, almost any tech-adjacent
//! person has a registration somewhere — a free, rate-limit-free
//! existence oracle with none of SMTP's greylisting or catch-all
//! ambiguity.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};
use crate::enrichment::patterns::generate_candidates;

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::Semaphore;

const ORACLE_URLS: &[&str] = &[
    "https://gravatar.com/avatar/{hash}?d=404&s=1",
    "https://cdn.libravatar.org/avatar/{hash}?d=404&s=1",
];

pub struct AvatarOracle {
    semaphore: Semaphore,
    probe_timeout: Duration,
}

impl AvatarOracle {
    pub fn new(_config: &Config) -> Self {
        AvatarOracle {
            semaphore: Semaphore::new(80),
            probe_timeout: Duration::from_secs(5),
        }
    }

    /// MD5 of the lowercased, trimmed address per the avatar-service spec.
    fn avatar_hash(email: &str) -> String {
        format!("{:x}", md5::compute(email.trim().to_lowercase().as_bytes()))
    }

    /// Probe one candidate against every oracle; a 200 from any service
    /// confirms the registration.
    async fn check_one(&self, email: &str, ctx: &StageContext) -> bool {
        let hash = Self::avatar_hash(email);
        for url_template in ORACLE_URLS {
            let url = url_template.replace("{hash}", &hash);
            let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
            match ctx
                .http
                .head(&url)
                .timeout(self.probe_timeout)
                .send()
                .await
            {
                Ok(resp) if resp.status().as_u16() == 200 => return true,
                Ok(_) => {}
                Err(e) => {
                    tracing::trace!(target: "avatar_oracle", "Probe failed for {}: {}", url, e);
                }
            }
        }
        false
    }

    /// Probe all candidates concurrently; the first confirmed one (in
    /// prevalence order) wins.
    async fn probe_candidates(&self, candidates: &[String], ctx: &StageContext) -> Option<String> {
        let probes = candidates.iter().map(|c| self.check_one(c, ctx));
        let results = join_all(probes).await;
        candidates
            .iter()
            .zip(results)
            .find(|(_, hit)| *hit)
            .map(|(candidate, _)| candidate.clone())
    }
}

#[async_trait]
impl EnrichmentStage for AvatarOracle {
    fn name(&self) -> &'static str {
        "avatar_oracle"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        let mut probed = 0usize;
        for (domain, indices) in groups {
            for idx in indices {
                let candidates = generate_candidates(&leads[idx].name, &domain);
                if candidates.is_empty() {
                    continue;
                }
                probed += candidates.len();

                if let Some(confirmed) = self.probe_candidates(&candidates, ctx).await {
                    tracing::info!(target: "avatar_oracle",
                        "Avatar oracle confirmed: {} -> {}", leads[idx].name, confirmed);
                    leads[idx].assign_email(confirmed, EmailStatus::ConfirmedByOracle);
                    report.leads_enriched += 1;
                }
            }
        }

        tracing::info!(target: "avatar_oracle",
            "Oracle complete: {} confirmed out of {} candidate probes", report.leads_enriched, probed);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_avatar_service_convention() {
        // Reference value from the Gravatar documentation example.
        assert_eq!(
            AvatarOracle::avatar_hash("MyEmailAddress@example.com "),
            "0bc83cb571cd1c50ba6f3e8a78ef1346"
        );
    }

    #[test]
    fn hash_is_case_and_whitespace_insensitive() {
        assert_eq!(
            AvatarOracle::avatar_hash("  Jane@Acme.VC "),
            AvatarOracle::avatar_hash("jane@acme.vc")
        );
    }
}
