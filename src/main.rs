//! # Lead Sleuth CLI
//!
//! Command-line interface for the Lead Sleuth library
//! (`lead_sleuth_core`). Parses arguments, sets up configuration,
//! crawls investor sources, runs the enrichment pipeline, and writes
//! the deduplicated exports.

use lead_sleuth_core::{
    check_smtp_connectivity, enrich_and_score, initialize_pipeline, Config, ConfigBuilder,
    CrawlEngine, CrawlStateStore, CsvExporter, DeepCrawler, Lead, LeadScorer, RunSummary,
    StageReport, VerticalConfig,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Discovers investor contacts and enriches them with verified email addresses.",
    long_about = "Lead Sleuth crawls investor directories and fund websites, extracts team \
                  contacts, discovers missing emails through a pipeline of OSINT techniques, \
                  verifies deliverability, and scores every lead against your startup profile."
)]
struct AppArgs {
    #[command(subcommand)]
    command: Command,

    /// Path to a configuration file (TOML). CLI args override file settings.
    #[arg(long, global = true, env = "LEAD_SLEUTH_CONFIG")]
    config_file: Option<String>,

    /// Path to a vertical definition (TOML). Defaults to the built-in VC vertical.
    #[arg(long, global = true, env = "LEAD_SLEUTH_VERTICAL")]
    vertical: Option<String>,

    /// Output directory for checkpoints and exports.
    #[arg(long, global = true, env = "LEAD_SLEUTH_OUTPUT_DIR")]
    output_dir: Option<String>,

    /// Maximum number of fund domains crawled concurrently.
    #[arg(short, long, global = true, env = "LEAD_SLEUTH_CONCURRENCY")]
    concurrency: Option<usize>,

    /// URL of a running WebDriver instance for browser-driven crawling.
    #[arg(long, global = true, env = "LEAD_SLEUTH_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Sender address used in SMTP verification conversations.
    #[arg(long, global = true, env = "LEAD_SLEUTH_SMTP_SENDER")]
    smtp_sender: Option<String>,

    /// Days a crawled domain stays fresh before re-crawling.
    #[arg(long, global = true, env = "LEAD_SLEUTH_STALE_DAYS")]
    stale_days: Option<u32>,

    /// Per-domain hard crawl budget in seconds.
    #[arg(long, global = true, env = "LEAD_SLEUTH_DOMAIN_TIMEOUT")]
    domain_timeout: Option<u64>,

    /// Disable SMTP probing entirely (pattern guesses stay unverified).
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    no_smtp: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl configured investor directories through their site adapters.
    Sites {
        /// Sites configuration file.
        #[arg(long, default_value = "config/sites.toml")]
        sites_config: String,

        /// Crawl a single named site instead of all enabled ones.
        #[arg(long)]
        site: Option<String>,

        /// Run the crawl but write no output files.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Deep-crawl fund websites from a target list.
    Deep {
        /// Target URLs file, one per line; `#` lines are comments.
        #[arg(long, default_value = "data/target_funds.txt")]
        targets: String,

        /// Ignore the freshness window and re-crawl everything.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        force_recrawl: bool,

        /// Crawl only the first N eligible targets (0 = all).
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Collect contacts but skip the enrichment pipeline.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        skip_enrichment: bool,
    },
    /// Re-run enrichment and scoring over the last crawl checkpoint.
    Enrich,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .init();

    tracing::info!("Lead Sleuth v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = AppArgs::parse();
    let config = Arc::new(build_config(&args)?);
    tracing::debug!("Effective configuration: {:?}", *config);

    let vertical = match args.vertical.as_deref() {
        Some(path) => VerticalConfig::load(path)
            .with_context(|| format!("Failed to load vertical '{}'", path))?,
        None => VerticalConfig::default(),
    };
    tracing::info!("Active vertical: {}", vertical.name);

    let start_time = Instant::now();
    match args.command {
        Command::Sites {
            ref sites_config,
            ref site,
            dry_run,
        } => run_sites_mode(Arc::clone(&config), sites_config, site.as_deref(), dry_run).await?,
        Command::Deep {
            ref targets,
            force_recrawl,
            limit,
            skip_enrichment,
        } => {
            run_deep_mode(
                Arc::clone(&config),
                &vertical,
                targets,
                force_recrawl,
                limit,
                skip_enrichment,
            )
            .await?
        }
        Command::Enrich => run_enrich_mode(Arc::clone(&config)).await?,
    }

    tracing::info!(
        "Finished successfully. Total duration: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut builder = ConfigBuilder::new();
    if let Some(ref path) = args.config_file {
        builder = builder.config_file(path);
    }
    if let Some(ref dir) = args.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(c) = args.concurrency {
        builder = builder.max_concurrent_domains(c);
    }
    if let Some(ref url) = args.webdriver_url {
        builder = builder.webdriver_url(Some(url.clone()));
    }
    if let Some(ref sender) = args.smtp_sender {
        builder = builder.smtp_sender_email(sender.clone());
    }
    if let Some(days) = args.stale_days {
        builder = builder.stale_days(days);
    }
    if let Some(secs) = args.domain_timeout {
        builder = builder.domain_hard_timeout(Duration::from_secs(secs));
    }
    if args.no_smtp {
        builder = builder.enable_smtp_verification(false);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build configuration: {}", e))
}

/// Shared back half of every mode: enrichment, scoring, export, summary.
async fn enrich_score_and_save(
    config: Arc<Config>,
    mut leads: Vec<Lead>,
    mut summary: RunSummary,
    dry_run: bool,
) -> Result<()> {
    if leads.is_empty() {
        tracing::warn!("No leads collected. Check your configs and selectors.");
        return Ok(());
    }

    let pipeline = initialize_pipeline(Arc::clone(&config))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize enrichment pipeline: {}", e))?;

    if config.enable_smtp_verification {
        match check_smtp_connectivity().await {
            Ok(()) => tracing::info!("SMTP connectivity test passed (outbound port 25 open)."),
            Err(e) => {
                tracing::warn!("SMTP connectivity test failed: {}", e);
                pipeline
                    .context()
                    .smtp
                    .fuse()
                    .trip(format!("outbound SMTP unavailable: {}", e));
            }
        }
    } else {
        pipeline
            .context()
            .smtp
            .fuse()
            .trip("SMTP probing disabled by configuration");
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Failed to set progress template")?,
    );
    progress.set_message(format!("Enriching {} leads...", leads.len()));
    progress.enable_steady_tick(Duration::from_millis(120));

    let mut scorer = LeadScorer::from_file(&config.scoring_config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load scoring config: {}", e))?;
    let reports = enrich_and_score(&pipeline, &mut scorer, &mut leads).await;
    progress.finish_with_message(format!("Enriched {} leads", leads.len()));

    summary.leads_found = leads.len();
    summary.emails_resolved = leads.iter().filter(|l| l.email.is_some()).count();
    summary.emails_verified = leads
        .iter()
        .filter(|l| l.email_status.is_positive())
        .count();
    summary.rate_limited_calls = reports.iter().map(|r| r.rate_limited).sum();
    if pipeline.context().smtp.fuse().is_tripped() {
        summary.record_trip("smtp");
    }
    if pipeline.context().dork_fuse.is_tripped() {
        summary.record_trip("search_dorker");
    }

    if dry_run {
        tracing::info!("DRY RUN - no files written");
    } else {
        let exporter = CsvExporter::new(&config.output_dir)
            .map_err(|e| anyhow::anyhow!("Failed to prepare output directory: {}", e))?;
        let master = exporter
            .write_master(&leads)
            .map_err(|e| anyhow::anyhow!("Failed to write master export: {}", e))?;
        tracing::info!("Master export written to {}", master.display());
    }

    log_summary(&summary, &reports, &scorer, &leads);
    Ok(())
}

async fn run_sites_mode(
    config: Arc<Config>,
    sites_config: &str,
    site: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    tracing::info!(
        "Running in directory mode. Sites config: '{}', site filter: {}",
        sites_config,
        site.unwrap_or("ALL")
    );
    if config.webdriver_url.is_none() {
        anyhow::bail!(
            "Directory mode drives a real browser; configure a WebDriver URL \
             (--webdriver-url or [browser] webdriver_url)."
        );
    }

    let engine = CrawlEngine::new(Arc::clone(&config), sites_config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize crawl engine: {}", e))?;
    let (leads, outcomes) = engine
        .run(site)
        .await
        .map_err(|e| anyhow::anyhow!("Directory crawl failed: {}", e))?;

    let mut summary = RunSummary {
        domains_targeted: outcomes.len(),
        domains_crawled: outcomes.iter().filter(|o| o.error.is_none()).count(),
        domains_failed: outcomes.iter().filter(|o| o.error.is_some()).count(),
        ..Default::default()
    };
    summary.leads_found = leads.len();

    let fp_stats = engine.fingerprint_stats();
    tracing::info!(
        "Fingerprints used: {} ({} unique UAs); proxied sessions: {}",
        fp_stats.total_generated,
        fp_stats.unique_user_agents,
        engine.proxied_requests()
    );

    enrich_score_and_save(config, leads, summary, dry_run).await
}

async fn run_deep_mode(
    config: Arc<Config>,
    vertical: &VerticalConfig,
    targets: &str,
    force_recrawl: bool,
    limit: usize,
    skip_enrichment: bool,
) -> Result<()> {
    tracing::info!(
        "Running in deep-crawl mode. Targets: '{}', force recrawl: {}",
        targets,
        force_recrawl
    );

    let state = Arc::new(
        CrawlStateStore::load(&config.crawl_state_path, config.stale_days)
            .map_err(|e| anyhow::anyhow!("Failed to load crawl state: {}", e))?,
    );
    let crawler = DeepCrawler::new(Arc::clone(&config), vertical, Arc::clone(&state), force_recrawl)
        .map_err(|e| anyhow::anyhow!("Failed to initialize deep crawler: {}", e))?;

    // --limit trims the target file through a temp copy so the crawler
    // sees a plain file either way.
    let effective_targets: String = if limit > 0 {
        let (all, _) = crawler
            .load_targets(targets)
            .map_err(|e| anyhow::anyhow!("Failed to read targets: {}", e))?;
        let limited: Vec<String> = all.into_iter().take(limit).collect();
        let tmp = PathBuf::from(&config.output_dir).join("targets_limited.txt");
        std::fs::create_dir_all(&config.output_dir)?;
        std::fs::write(&tmp, limited.join("\n"))?;
        tmp.to_string_lossy().into_owned()
    } else {
        targets.to_string()
    };

    let outcome = crawler
        .run(&effective_targets)
        .await
        .map_err(|e| anyhow::anyhow!("Deep crawl failed: {}", e))?;

    if skip_enrichment {
        tracing::info!(
            "Skipping enrichment as requested; {} raw contacts remain in the checkpoint.",
            outcome.leads.len()
        );
        log_summary(&outcome.summary, &[], &LeadScorer::from_file(&config.scoring_config_path)
            .map_err(|e| anyhow::anyhow!("{}", e))?, &outcome.leads);
        return Ok(());
    }

    enrich_score_and_save(config, outcome.leads, outcome.summary, false).await
}

async fn run_enrich_mode(config: Arc<Config>) -> Result<()> {
    let checkpoint = PathBuf::from(&config.output_dir).join("crawl_checkpoint.csv");
    tracing::info!(
        "Running in enrich mode from checkpoint {}",
        checkpoint.display()
    );

    let leads = lead_sleuth_core::crawler::checkpoint::load_checkpoint(&checkpoint)
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint: {}", e))?;
    if leads.is_empty() {
        anyhow::bail!("Checkpoint {} holds no leads to enrich.", checkpoint.display());
    }
    tracing::info!("Loaded {} contacts from checkpoint", leads.len());

    let summary = RunSummary {
        leads_found: leads.len(),
        ..Default::default()
    };
    enrich_score_and_save(config, leads, summary, false).await
}

/// Logs the run summary in a fixed, grep-friendly layout.
fn log_summary(
    summary: &RunSummary,
    reports: &[StageReport],
    scorer: &LeadScorer,
    leads: &[Lead],
) {
    let stats = scorer.stats();
    tracing::info!("-------------------- Run Summary --------------------");
    tracing::info!("Domains targeted           : {}", summary.domains_targeted);
    tracing::info!("  - Crawled                : {}", summary.domains_crawled);
    tracing::info!("  - Skipped (fresh)        : {}", summary.domains_skipped_fresh);
    tracing::info!("  - Skipped (timeout)      : {}", summary.domains_skipped_timeout);
    tracing::info!("  - Failed                 : {}", summary.domains_failed);
    tracing::info!("Leads collected            : {}", summary.leads_found);
    tracing::info!("  - With email             : {}", summary.emails_resolved);
    tracing::info!("  - Verified/confirmed     : {}", summary.emails_verified);
    tracing::info!("Rate-limited calls         : {}", summary.rate_limited_calls);
    if summary.tripped_subsystems.is_empty() {
        tracing::info!("Self-disabled subsystems   : none");
    } else {
        tracing::info!(
            "Self-disabled subsystems   : {}",
            summary.tripped_subsystems.join(", ")
        );
    }
    for report in reports {
        if report.skipped {
            tracing::info!("  stage {:<16} skipped", report.stage);
        } else {
            tracing::info!(
                "  stage {:<16} +{} emails across {} domains",
                report.stage,
                report.leads_enriched,
                report.domains_touched
            );
        }
    }
    if stats.total_scored > 0 {
        tracing::info!(
            "Scores: avg {:.1}, {} hot, {} warm",
            stats.avg_score,
            stats.hot_count,
            stats.warm_count
        );
    }

    // Top 5 preview for the operator.
    for lead in leads.iter().take(5) {
        tracing::info!(
            "  {} {} ({}) - {} [{}]",
            lead.tier,
            lead.name,
            lead.fund,
            lead.email.as_deref().unwrap_or("N/A"),
            lead.lead_score
        );
    }
    tracing::info!("-----------------------------------------------------");
}
