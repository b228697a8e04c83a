//! Multi-stage email enrichment pipeline.
//!
//! A lead missing an email flows through an ordered sequence of
//! independent OSINT stages, cheapest and most reliable first. Every
//! stage groups its work by organization domain so expensive per-domain
//! probes happen once (memoized in [`DomainCache`]) and fan back out to
//! all leads sharing the domain. Stages only touch leads still missing
//! an email, which makes the pipeline strictly monotonic and
//! idempotent: re-running it on a resolved set is a no-op.

pub mod avatar;
pub mod catchall;
pub mod commits;
pub mod dns_harvest;
pub mod domain_cache;
pub mod dorker;
pub mod filings;
pub mod freshness;
pub mod guesser;
pub mod keyserver;
pub mod patterns;
pub mod scoring;
pub mod validator;
pub mod verify;
pub mod wayback;

pub use domain_cache::{DomainCache, DomainRecord};
pub use scoring::LeadScorer;

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::Lead;
use crate::utils::dns::{create_resolver, resolve_mail_server};
use crate::utils::rate_limit::Fuse;
use crate::utils::smtp::SmtpVerifier;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use trust_dns_resolver::TokioAsyncResolver;

/// Per-stage outcome accounting, rolled up into the run summary.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub stage: &'static str,
    pub leads_enriched: usize,
    pub domains_touched: usize,
    pub rate_limited: usize,
    pub skipped: bool,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        StageReport {
            stage,
            ..Default::default()
        }
    }

    pub fn skipped(stage: &'static str) -> Self {
        StageReport {
            stage,
            skipped: true,
            ..Default::default()
        }
    }
}

/// Shared services handed to every stage.
pub struct StageContext {
    pub config: Arc<Config>,
    pub cache: Arc<DomainCache>,
    pub http: reqwest::Client,
    pub resolver: Arc<TokioAsyncResolver>,
    pub smtp: SmtpVerifier,
    /// Trips when the search engine serves a captcha or hard rate limit.
    pub dork_fuse: Fuse,
}

impl StageContext {
    /// MX existence for a domain, probed at most once per run
    /// (single-flight through the cache). A resolver timeout yields
    /// `None` — unknown, not absent.
    pub async fn probe_mx(&self, domain: &str) -> Option<bool> {
        let resolver = Arc::clone(&self.resolver);
        let domain_owned = domain.to_string();
        self.cache
            .mx_or_probe(domain, || async move {
                match resolve_mail_server(&resolver, &domain_owned).await {
                    Ok(ms) => Some((true, Some(ms.exchange))),
                    Err(AppError::NxDomain(_)) | Err(AppError::NoDnsRecords(_)) => {
                        Some((false, None))
                    }
                    Err(e) => {
                        tracing::debug!(target: "enrichment",
                            "MX probe for {} indeterminate: {}", domain_owned, e);
                        None
                    }
                }
            })
            .await
    }
}

/// One enrichment technique.
#[async_trait]
pub trait EnrichmentStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Enrich in place. Implementations must only assign emails to
    /// leads where `lead.needs_email()` holds.
    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport;
}

/// The ordered pipeline.
pub struct EnrichmentPipeline {
    ctx: StageContext,
    stages: Vec<Box<dyn EnrichmentStage>>,
}

impl EnrichmentPipeline {
    /// Assemble the enabled stages in the fixed cheap-to-expensive
    /// order. Stage toggles come from configuration; a disabled stage
    /// simply doesn't exist for this run.
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;
        let resolver = Arc::new(create_resolver(&config).await?);
        let smtp_fuse = Fuse::new();
        let smtp = SmtpVerifier::new(Arc::clone(&config), smtp_fuse);

        let ctx = StageContext {
            cache: Arc::new(DomainCache::new()),
            http,
            resolver,
            smtp,
            dork_fuse: Fuse::new(),
            config: Arc::clone(&config),
        };

        let mut stages: Vec<Box<dyn EnrichmentStage>> = Vec::new();
        stages.push(Box::new(guesser::PatternGuesser::new(&config)));
        if config.enable_dns_harvest {
            stages.push(Box::new(dns_harvest::DnsHarvester::new(&config)));
        }
        if config.enable_dorking {
            stages.push(Box::new(dorker::SearchDorker::new(&config)));
        }
        if config.enable_avatar_oracle {
            stages.push(Box::new(avatar::AvatarOracle::new(&config)));
        }
        if config.enable_keyserver {
            stages.push(Box::new(keyserver::KeyserverSearch::new(&config)));
        }
        if config.enable_commit_miner {
            stages.push(Box::new(commits::CommitMiner::new(&config)));
        }
        if config.enable_filings {
            stages.push(Box::new(filings::FilingsSearch::new(&config)));
        }
        if config.enable_wayback {
            stages.push(Box::new(wayback::WaybackMiner::new(&config)));
        }
        if config.enable_catchall {
            stages.push(Box::new(catchall::CatchAllStage::new(&config)));
        }
        if config.enable_smtp_verification {
            stages.push(Box::new(verify::SmtpVerifyStage::new(&config)));
        }

        Ok(EnrichmentPipeline { ctx, stages })
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Run every stage in order. One failing module never blocks the
    /// remaining modules from running on the same leads.
    pub async fn run(&self, leads: &mut Vec<Lead>) -> Vec<StageReport> {
        // Pre-pass: drop scraped emails that fail offline validation so
        // the discovery stages get a chance to find something better.
        for lead in leads.iter_mut() {
            if let Some(ref email) = lead.email {
                let outcome = validator::validate_email(&self.ctx.config, email);
                if outcome.quality == validator::EmailQuality::Invalid {
                    tracing::debug!(target: "enrichment",
                        "Dropping invalid scraped email '{}' for {}", email, lead.name);
                    lead.clear_email();
                }
            }
        }

        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let missing_before = leads.iter().filter(|l| l.needs_email()).count();
            if missing_before == 0 && stage.name() != "smtp_verify" {
                tracing::info!(target: "enrichment",
                    "{}: every lead already has an email, skipping.", stage.name());
                reports.push(StageReport::skipped(stage.name()));
                continue;
            }

            tracing::info!(target: "enrichment",
                "Running stage '{}' ({} leads still missing email)...", stage.name(), missing_before);
            let report = stage.enrich(leads, &self.ctx).await;
            tracing::info!(target: "enrichment",
                "Stage '{}' complete: {} leads enriched across {} domains ({} rate-limited calls)",
                report.stage, report.leads_enriched, report.domains_touched, report.rate_limited
            );
            reports.push(report);
        }
        reports
    }
}

/// Group lead indices by registrable website domain, optionally limited
/// to leads still missing an email. The index indirection lets stages
/// mutate `leads` while iterating groups.
pub(crate) fn group_by_domain(leads: &[Lead], only_needing_email: bool) -> HashMap<String, Vec<usize>> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, lead) in leads.iter().enumerate() {
        if only_needing_email && !lead.needs_email() {
            continue;
        }
        if let Some(domain) = crate::utils::domain::bare_domain(&lead.website) {
            groups.entry(domain).or_default().push(idx);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::EmailStatus;

    fn lead(name: &str, website: &str, email: Option<&str>) -> Lead {
        let mut lead = Lead::new(name, "Acme Ventures", website);
        if let Some(e) = email {
            lead.assign_email(e, EmailStatus::ScrapedFromPage);
        }
        lead
    }

    #[test]
    fn grouping_skips_resolved_and_unusable_websites() {
        let leads = vec![
            lead("Jane Smith", "https://acme.vc", None),
            lead("Bob Jones", "https://acme.vc", Some("bob@acme.vc")),
            lead("Carol White", "N/A", None),
            lead("Dave Black", "https://other.fund", None),
        ];
        let groups = group_by_domain(&leads, true);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["acme.vc"], vec![0]);
        assert_eq!(groups["other.fund"], vec![3]);

        let all = group_by_domain(&leads, false);
        assert_eq!(all["acme.vc"], vec![0, 1]);
    }
}
