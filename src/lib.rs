//! # Lead Sleuth Core Library
//!
//! Discovers investor contacts across the web and enriches each one
//! with a deliverable email address, confidence signals, and a priority
//! score.
//!
//! The crate is organized around a crawl-and-enrich pipeline:
//!
//! - [`adapters`] — the site-adapter contract plus a generic pagination
//!   driver for directory sites;
//! - [`crawler`] — the deep crawler that mines arbitrary fund websites
//!   for team contacts, with checkpointed progress;
//! - [`enrichment`] — the ordered email-discovery pipeline (pattern
//!   learning, DNS, search, avatar oracle, keyservers, commit mining,
//!   filings, web archive, catch-all handling) capped by SMTP
//!   deliverability verification, and the scoring engine;
//! - [`stealth`] — browser fingerprints, humanlike behavior, proxies;
//! - [`output`] — deduplicated master/history/delta exports.
//!
//! It is designed to be used either directly as a library or via the
//! `lead-sleuth` command-line tool.

pub mod adapters;
pub mod browser;
pub mod core;
pub mod crawler;
pub mod enrichment;
pub mod output;
pub mod stealth;
pub mod utils;
pub mod vertical;

pub use crate::core::config::{Config, ConfigBuilder};
pub use crate::core::engine::CrawlEngine;
pub use crate::core::error::{AppError, ExtractionError, Result};
pub use crate::core::models::{EmailStatus, Lead, RunSummary};
pub use crate::crawler::{CrawlRunOutcome, DeepCrawler};
pub use crate::enrichment::freshness::{CrawlStateStore, CrawlStatus};
pub use crate::enrichment::scoring::LeadScorer;
pub use crate::enrichment::{DomainCache, EnrichmentPipeline, StageReport};
pub use crate::output::CsvExporter;
pub use crate::vertical::VerticalConfig;

use std::sync::Arc;

/// Performs an early check for SMTP connectivity.
///
/// Outbound port 25 is blocked on many consumer and cloud networks;
/// knowing this up front lets the run trip the SMTP fuse once instead
/// of timing out against every mail exchanger it meets.
pub async fn check_smtp_connectivity() -> Result<()> {
    crate::utils::smtp::test_smtp_connectivity().await
}

/// Builds the enrichment pipeline for a run.
pub async fn initialize_pipeline(config: Arc<Config>) -> Result<EnrichmentPipeline> {
    EnrichmentPipeline::new(config).await
}

/// Runs enrichment and scoring over a collected lead set, in place.
///
/// This is the shared back half of every mode: directory crawls, deep
/// crawls, and checkpoint re-runs all converge here.
pub async fn enrich_and_score(
    pipeline: &EnrichmentPipeline,
    scorer: &mut LeadScorer,
    leads: &mut Vec<Lead>,
) -> Vec<StageReport> {
    let total = leads.len();
    let missing_before = leads.iter().filter(|l| l.needs_email()).count();
    tracing::info!(
        "Enriching {} leads ({} missing an email address)...",
        total,
        missing_before
    );

    let reports = pipeline.run(leads).await;

    let missing_after = leads.iter().filter(|l| l.needs_email()).count();
    tracing::info!(
        "Enrichment complete: {} of {} missing emails resolved ({} patterns cached for {} domains)",
        missing_before - missing_after,
        missing_before,
        pipeline.context().cache.patterns_learned(),
        pipeline.context().cache.len(),
    );

    tracing::info!("Scoring {} leads...", leads.len());
    scorer.score_batch(leads);

    reports
}
