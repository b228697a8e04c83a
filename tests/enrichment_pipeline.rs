//! End-to-end tests for the enrichment pipeline's offline guarantees:
//! pattern learning and propagation, monotonicity/idempotence, the
//! email/provenance invariant, and catch-all generation consistency.

use lead_sleuth_core::enrichment::catchall::CatchAllStage;
use lead_sleuth_core::enrichment::guesser::PatternGuesser;
use lead_sleuth_core::enrichment::patterns::EmailPattern;
use lead_sleuth_core::enrichment::{DomainCache, EnrichmentStage, StageContext};
use lead_sleuth_core::utils::dns::create_resolver;
use lead_sleuth_core::utils::rate_limit::Fuse;
use lead_sleuth_core::utils::smtp::SmtpVerifier;
use lead_sleuth_core::{Config, EmailStatus, Lead};

use std::sync::Arc;

async fn offline_context(mut config: Config) -> StageContext {
    // Keep resolver waits short: these tests must pass with no network.
    config.dns_timeout = std::time::Duration::from_secs(1);
    let config = Arc::new(config);
    let smtp_fuse = Fuse::new();
    // Probing is disabled up front so no test ever opens a socket.
    smtp_fuse.trip("offline test context");
    StageContext {
        http: reqwest::Client::new(),
        resolver: Arc::new(create_resolver(&config).await.unwrap()),
        smtp: SmtpVerifier::new(Arc::clone(&config), smtp_fuse),
        cache: Arc::new(DomainCache::new()),
        dork_fuse: Fuse::new(),
        config,
    }
}

fn lead(name: &str, website: &str) -> Lead {
    let mut lead = Lead::new(name, "Acme Ventures", website);
    lead.scraped_at = chrono::Utc::now().to_rfc3339();
    lead
}

#[tokio::test]
async fn sibling_pattern_propagates_to_unresolved_leads() {
    // A sibling contact already resolved to john@acme.vc: the guesser
    // must learn {first}@{domain} and give Jane jane@acme.vc without
    // any network traffic.
    let ctx = offline_context(Config::default()).await;
    let guesser = PatternGuesser::new(&ctx.config);

    let mut john = lead("John Miller", "https://acme.vc");
    john.assign_email("john@acme.vc", EmailStatus::VerifiedBySmtp);
    let jane = lead("Jane Smith", "https://acme.vc");

    let mut leads = vec![john, jane];
    let report = guesser.enrich(&mut leads, &ctx).await;

    assert_eq!(report.leads_enriched, 1);
    let jane = leads.iter().find(|l| l.name == "Jane Smith").unwrap();
    assert_eq!(jane.email.as_deref(), Some("jane@acme.vc"));
    assert_eq!(jane.email_status, EmailStatus::PatternGuessed);
    assert_eq!(
        ctx.cache.learned_pattern("acme.vc").await,
        Some(EmailPattern::First)
    );
}

#[tokio::test]
async fn learned_pattern_governs_every_guess_at_the_domain() {
    let ctx = offline_context(Config::default()).await;
    let guesser = PatternGuesser::new(&ctx.config);

    let mut anchor = lead("Ada Lovelace", "https://fund.example");
    anchor.assign_email("a.lovelace@fund.example", EmailStatus::ScrapedFromPage);

    let mut leads = vec![
        anchor,
        lead("Grace Hopper", "https://fund.example"),
        lead("Alan Turing", "https://fund.example"),
    ];
    guesser.enrich(&mut leads, &ctx).await;

    let pattern = ctx.cache.learned_pattern("fund.example").await.unwrap();
    assert_eq!(pattern, EmailPattern::FInitialDotLast);
    for lead in leads.iter().filter(|l| l.name != "Ada Lovelace") {
        let email = lead.email.as_deref().expect("pattern should propagate");
        let expected = pattern.apply(&lead.name, "fund.example").unwrap();
        assert_eq!(email, expected, "guess for {} violates the learned pattern", lead.name);
    }
}

#[tokio::test]
async fn enrichment_is_monotonic_and_idempotent() {
    let ctx = offline_context(Config::default()).await;
    let guesser = PatternGuesser::new(&ctx.config);

    let mut anchor = lead("John Miller", "https://acme.vc");
    anchor.assign_email("john@acme.vc", EmailStatus::VerifiedBySmtp);
    let mut leads = vec![anchor, lead("Jane Smith", "https://acme.vc")];

    guesser.enrich(&mut leads, &ctx).await;
    let snapshot: Vec<(Option<String>, EmailStatus)> = leads
        .iter()
        .map(|l| (l.email.clone(), l.email_status))
        .collect();

    // Re-running on the fully-resolved set must change nothing.
    let report = guesser.enrich(&mut leads, &ctx).await;
    assert_eq!(report.leads_enriched, 0);
    let after: Vec<(Option<String>, EmailStatus)> = leads
        .iter()
        .map(|l| (l.email.clone(), l.email_status))
        .collect();
    assert_eq!(snapshot, after);
}

#[tokio::test]
async fn provenance_never_verified_while_email_is_sentinel() {
    let ctx = offline_context(Config::default()).await;
    let guesser = PatternGuesser::new(&ctx.config);

    // Company-named records and single-word names stay unresolved.
    let mut leads = vec![
        lead("Acme Capital", "https://acme.vc"),
        lead("Madonna", "https://acme.vc"),
    ];
    guesser.enrich(&mut leads, &ctx).await;

    for lead in &leads {
        if lead.email.is_none() {
            assert_eq!(lead.email_status, EmailStatus::Unverified);
        }
        if lead.email_status.is_positive() {
            assert!(lead.email.is_some());
        }
    }
}

#[tokio::test]
async fn catch_all_domains_generate_pattern_consistent_addresses() {
    let config = Config {
        webdriver_url: None, // phase 2 rendering is unavailable offline
        ..Config::default()
    };
    let ctx = offline_context(config).await;

    // The domain was already classified this run: catch-all, with a
    // learned {f}{last} pattern from a scraped sibling.
    ctx.cache
        .catch_all_or_probe("acme.vc", || async { Some(true) })
        .await;
    ctx.cache
        .learn_pattern("acme.vc", EmailPattern::FInitialLast)
        .await;

    let stage = CatchAllStage::new(&ctx.config);
    let mut leads = vec![lead("Jane Smith", "https://acme.vc"), lead("Bob Jones", "https://acme.vc")];
    let report = stage.enrich(&mut leads, &ctx).await;

    assert_eq!(report.leads_enriched, 2);
    for l in &leads {
        assert_eq!(l.email_status, EmailStatus::CatchAllGenerated);
    }
    assert_eq!(
        leads.iter().find(|l| l.name == "Jane Smith").unwrap().email.as_deref(),
        Some("jsmith@acme.vc")
    );
    assert_eq!(
        leads.iter().find(|l| l.name == "Bob Jones").unwrap().email.as_deref(),
        Some("bjones@acme.vc")
    );
}

#[tokio::test]
async fn tripped_smtp_fuse_short_circuits_discovery_probes() {
    // With the SMTP fuse tripped and no sibling email to learn from,
    // the guesser can only fall back to the MX-gated default — and the
    // MX probe for a reserved test domain must not resolve to true.
    // Everything stays unresolved rather than mis-tagged.
    let ctx = offline_context(Config::default()).await;
    let guesser = PatternGuesser::new(&ctx.config);

    let mut leads = vec![lead("Jane Smith", "https://acme.invalid")];
    guesser.enrich(&mut leads, &ctx).await;

    let jane = &leads[0];
    if jane.email.is_none() {
        assert_eq!(jane.email_status, EmailStatus::Unverified);
    }
}
