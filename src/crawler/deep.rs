//! Deep crawler for fund websites.
//!
//! Given a fund's homepage, discovers team/about pages (URL-path and
//! anchor-text keywords, same-site links only, conventional-path
//! fallback), runs the three extraction heuristics over each candidate
//! page, and fuzzy-assigns orphaned emails to names. Domains crawl in
//! batches under a hard per-domain wall-clock budget and an aggregate
//! batch budget; progress checkpoints to disk after every batch so a
//! crash loses at most one batch.

use crate::browser;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{EmailStatus, Lead, RunSummary};
use crate::crawler::checkpoint::{load_checkpoint, save_checkpoint};
use crate::crawler::extract::TeamPageExtractor;
use crate::crawler::matching::take_best_match;
use crate::enrichment::freshness::{CrawlStateStore, CrawlStatus};
use crate::stealth::FingerprintManager;
use crate::utils::domain::{join_url, normalize_url, same_site};
use crate::vertical::VerticalConfig;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Conventional team-page paths tried when homepage discovery finds
/// nothing.
const FALLBACK_PATHS: &[&str] = &[
    "/team", "/about", "/people", "/about-us", "/our-team",
    "/leadership", "/who-we-are", "/about/team", "/partners", "/our-people",
];

/// Labels of controls that reveal more team members when clicked.
const LOAD_MORE_LABELS: &[&str] = &["Load More", "Show More", "View All", "See All", "Show all"];

/// Outcome of one full deep-crawl run.
pub struct CrawlRunOutcome {
    pub leads: Vec<Lead>,
    pub summary: RunSummary,
}

pub struct DeepCrawler {
    config: Arc<Config>,
    http: reqwest::Client,
    extractor: TeamPageExtractor,
    team_keywords: Vec<String>,
    default_sectors: Vec<String>,
    default_check_size: Option<String>,
    state: Arc<CrawlStateStore>,
    force_recrawl: bool,
    checkpoint_path: PathBuf,
    anchor_sel: Selector,
    page_param_re: Regex,
}

impl DeepCrawler {
    pub fn new(
        config: Arc<Config>,
        vertical: &VerticalConfig,
        state: Arc<CrawlStateStore>,
        force_recrawl: bool,
    ) -> Result<Self> {
        let fingerprints = FingerprintManager::new();
        let identity = fingerprints.generate();
        let http = reqwest::Client::builder()
            .user_agent(identity.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        let checkpoint_path = PathBuf::from(&config.output_dir).join("crawl_checkpoint.csv");

        Ok(DeepCrawler {
            extractor: TeamPageExtractor::new(&vertical.role_keywords),
            team_keywords: vertical.team_page_keywords.clone(),
            default_sectors: vertical.default_sectors.clone(),
            default_check_size: vertical.default_check_size.clone(),
            config,
            http,
            state,
            force_recrawl,
            checkpoint_path,
            anchor_sel: Selector::parse("a[href]").expect("static selector"),
            page_param_re: Regex::new(r"[?&]page=\d+").expect("static regex"),
        })
    }

    /// Load target URLs from a file (one per line, `#` comments), dedup,
    /// and drop domains still inside the freshness window. Returns the
    /// eligible targets and the count of fresh domains skipped.
    pub fn load_targets(&self, path: &str) -> Result<(Vec<String>, usize)> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Cannot read targets file '{}': {}", path, e))
        })?;

        let mut seen = HashSet::new();
        let targets: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| seen.insert(line.to_lowercase()))
            .map(str::to_string)
            .collect();

        if self.force_recrawl {
            return Ok((targets, 0));
        }

        let (stale, fresh) = self.state.filter_stale(&targets);
        if !fresh.is_empty() {
            tracing::info!(target: "deep_crawl",
                "Skipping {} domains crawled within the last {} days (use --force-recrawl to override)",
                fresh.len(), self.config.stale_days);
        }
        Ok((stale, fresh.len()))
    }

    /// Crawl every eligible target in batches.
    pub async fn run(&self, targets_file: &str) -> Result<CrawlRunOutcome> {
        let (targets, skipped_fresh) = self.load_targets(targets_file)?;
        let mut summary = RunSummary {
            domains_targeted: targets.len() + skipped_fresh,
            domains_skipped_fresh: skipped_fresh,
            ..Default::default()
        };

        tracing::info!(target: "deep_crawl",
            "Deep crawl starting: {} target funds, {} concurrent, {:?} hard budget per domain",
            targets.len(), self.config.max_concurrent_domains, self.config.domain_hard_timeout);

        // Crash recovery: pick up whatever the previous run checkpointed.
        let mut all_leads = load_checkpoint(&self.checkpoint_path)?;

        for (batch_number, batch) in targets
            .chunks(self.config.max_concurrent_domains.max(1))
            .enumerate()
        {
            tracing::info!(target: "deep_crawl",
                "Batch {}: {} domains", batch_number + 1, batch.len());

            let mut pending: HashSet<String> = batch.iter().cloned().collect();
            let mut tasks = FuturesUnordered::new();
            for url in batch {
                let url = url.clone();
                tasks.push(async move {
                    let started = std::time::Instant::now();
                    let result = tokio::time::timeout(
                        self.config.domain_hard_timeout,
                        self.crawl_domain(&url),
                    )
                    .await;
                    (url, started.elapsed(), result)
                });
            }

            // Aggregate batch budget: a batch timeout abandons only the
            // domains still pending, never completed results.
            let batch_deadline = tokio::time::Instant::now()
                + self.config.batch_timeout_per_domain * batch.len() as u32;

            loop {
                match tokio::time::timeout_at(batch_deadline, tasks.next()).await {
                    Ok(Some((url, elapsed, result))) => {
                        pending.remove(&url);
                        match result {
                            Ok(Ok(leads)) => {
                                tracing::info!(target: "deep_crawl",
                                    "{}: {} contacts in {:.1?}", url, leads.len(), elapsed);
                                self.state.mark_crawled(
                                    &url,
                                    leads.len(),
                                    CrawlStatus::Completed,
                                    elapsed.as_secs_f64(),
                                );
                                summary.domains_crawled += 1;
                                all_leads.extend(leads);
                            }
                            Ok(Err(e)) => {
                                tracing::warn!(target: "deep_crawl", "{} failed: {}", url, e);
                                self.state.mark_crawled(
                                    &url,
                                    0,
                                    CrawlStatus::Failed,
                                    elapsed.as_secs_f64(),
                                );
                                summary.domains_failed += 1;
                            }
                            Err(_) => {
                                tracing::warn!(target: "deep_crawl",
                                    "{} skipped (timeout after {:?})",
                                    url, self.config.domain_hard_timeout);
                                self.state.mark_crawled(
                                    &url,
                                    0,
                                    CrawlStatus::SkippedTimeout,
                                    elapsed.as_secs_f64(),
                                );
                                summary.domains_skipped_timeout += 1;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(target: "deep_crawl",
                            "Batch timeout: abandoning {} pending domains", pending.len());
                        for url in pending.drain() {
                            self.state
                                .mark_crawled(&url, 0, CrawlStatus::SkippedTimeout, 0.0);
                            summary.domains_skipped_timeout += 1;
                        }
                        break;
                    }
                }
            }

            tracing::info!(target: "deep_crawl", "Running total: {} contacts", all_leads.len());
            save_checkpoint(&self.checkpoint_path, &all_leads)?;
            self.state.persist()?;
        }

        // Vertical defaults backfill attributes the pages never state.
        for lead in &mut all_leads {
            if lead.focus_areas.is_empty() {
                lead.focus_areas = self.default_sectors.clone();
            }
            if lead.check_size.is_none() {
                lead.check_size = self.default_check_size.clone();
            }
        }

        summary.leads_found = all_leads.len();
        Ok(CrawlRunOutcome {
            leads: all_leads,
            summary,
        })
    }

    /// Crawl one fund website. The caller wraps this in the hard
    /// per-domain timeout.
    async fn crawl_domain(&self, fund_url: &str) -> Result<Vec<Lead>> {
        let base = normalize_url(fund_url)?;
        let fund_name = fund_display_name(&base);

        tracing::debug!(target: "deep_crawl", "Visiting {}", fund_url);
        let mut team_urls: Vec<Url> = match self.fetch(base.as_str()).await {
            Some(html) => self.discover_team_pages(&html, &base),
            None => Vec::new(),
        };

        if team_urls.is_empty() {
            team_urls = FALLBACK_PATHS
                .iter()
                .filter_map(|path| join_url(&base, path))
                .collect();
        }
        tracing::debug!(target: "deep_crawl",
            "{}: {} candidate team pages", fund_name, team_urls.len());

        let mut browser_client: Option<fantoccini::Client> = None;
        let mut found: Vec<Lead> = Vec::new();

        for team_url in team_urls.into_iter().take(self.config.team_page_limit) {
            let Some(source) = self.fetch(team_url.as_str()).await else {
                continue;
            };
            if looks_like_missing_page(&source) {
                continue;
            }

            let mut page_contacts =
                self.extract_from_page(&source, team_url.as_str(), &fund_name, fund_url);

            // Bounded ?page=N sweep over same-site pagination links.
            for page_link in self
                .pagination_links(&source, &team_url)
                .into_iter()
                .take(self.config.pagination_sweep_limit)
            {
                if let Some(extra) = self.fetch(page_link.as_str()).await {
                    page_contacts.extend(self.extract_from_page(
                        &extra,
                        page_link.as_str(),
                        &fund_name,
                        fund_url,
                    ));
                }
            }

            // JS-heavy pages render nothing statically; fall back to a
            // real browser when one is configured, including a bounded
            // load-more sweep.
            if page_contacts.is_empty() && self.config.webdriver_url.is_some() {
                if browser_client.is_none() {
                    let fingerprints = FingerprintManager::new();
                    browser_client =
                        browser::create_client(&self.config, &fingerprints.generate(), None)
                            .await
                            .map_err(|e| {
                                tracing::debug!(target: "deep_crawl",
                                    "Browser session unavailable: {}", e);
                                e
                            })
                            .ok();
                }
                if let Some(client) = &browser_client {
                    page_contacts = self
                        .extract_rendered(client, team_url.as_str(), &fund_name, fund_url)
                        .await;
                }
            }

            if !page_contacts.is_empty() {
                tracing::info!(target: "deep_crawl",
                    "Extracted {} contacts from {}", page_contacts.len(), team_url);
            }
            found.extend(page_contacts);
        }

        if let Some(client) = browser_client {
            browser::close_client(client, &format!("[{}]", fund_name)).await;
        }

        // Dedup by name (case-insensitive) within the domain.
        let before = found.len();
        let mut seen = HashSet::new();
        found.retain(|lead| seen.insert(lead.name.trim().to_lowercase()));
        if found.len() != before {
            tracing::debug!(target: "deep_crawl",
                "Deduped {} -> {} contacts for {}", before, found.len(), fund_name);
        }

        Ok(found)
    }

    async fn fetch(&self, url: &str) -> Option<String> {
        match self.http.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                tracing::debug!(target: "deep_crawl", "{} returned {}", url, resp.status());
                None
            }
            Err(e) => {
                tracing::debug!(target: "deep_crawl", "Fetch failed for {}: {}", url, e);
                None
            }
        }
    }

    /// Scan a homepage for links to team/about pages by URL path and by
    /// anchor text, restricted to the fund's own site.
    fn discover_team_pages(&self, html: &str, base: &Url) -> Vec<Url> {
        let doc = Html::parse_document(html);
        let mut urls: Vec<Url> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for anchor in doc.select(&self.anchor_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(full) = join_url(base, href) else {
                continue;
            };
            if !same_site(base, &full) {
                continue;
            }

            let path_hit = {
                let path = full.path().to_lowercase();
                self.team_keywords.iter().any(|kw| path.contains(kw))
            };
            let text_hit = {
                let text = anchor
                    .text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                ["team", "people", "about us", "who we are", "our team"]
                    .iter()
                    .any(|kw| text.contains(kw))
            };

            if (path_hit || text_hit) && seen.insert(full.as_str().to_string()) {
                urls.push(full);
            }
        }
        urls
    }

    /// Same-site links carrying a `?page=N` query parameter.
    fn pagination_links(&self, html: &str, page_url: &Url) -> Vec<Url> {
        let doc = Html::parse_document(html);
        let mut links = Vec::new();
        let mut seen = HashSet::new();
        for anchor in doc.select(&self.anchor_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(full) = join_url(page_url, href) else {
                continue;
            };
            if same_site(page_url, &full)
                && self.page_param_re.is_match(full.as_str())
                && seen.insert(full.as_str().to_string())
            {
                links.push(full);
            }
        }
        links
    }

    /// Run all three extractors over one page and merge their outputs.
    fn extract_from_page(
        &self,
        source: &str,
        url: &str,
        fund_name: &str,
        fund_url: &str,
    ) -> Vec<Lead> {
        let doc = Html::parse_document(source);

        let emails = self.extractor.harvest_emails(&doc, source);
        let linkedin_urls = self.extractor.harvest_social(&doc);
        let pairs = self.extractor.name_role_pairs(&doc);

        let mut contacts: Vec<Lead> = Vec::new();
        for pair in &pairs {
            let mut lead = Lead::new(pair.name.clone(), fund_name, fund_url);
            lead.role = pair.role.clone();
            lead.source = url.to_string();
            lead.scraped_at = Utc::now().to_rfc3339();

            // LinkedIn match by squashed name prefix in the profile slug.
            let squashed: String = pair
                .name
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect();
            let prefix: String = squashed.chars().take(6).collect();
            if !prefix.is_empty() {
                lead.linkedin = linkedin_urls
                    .iter()
                    .find(|u| u.to_lowercase().replace('-', "").contains(&prefix))
                    .cloned();
            }
            contacts.push(lead);
        }

        // Emails with no name/role pairs on the page still count: they
        // become anonymous org contacts rather than being thrown away.
        if contacts.is_empty() && !emails.is_empty() {
            for email in &emails {
                let mut lead = Lead::new("Unknown", fund_name, fund_url);
                lead.source = url.to_string();
                lead.scraped_at = Utc::now().to_rfc3339();
                lead.assign_email(email.clone(), EmailStatus::ScrapedFromPage);
                contacts.push(lead);
            }
            return contacts;
        }

        // Fuzzy-assign orphaned page emails to extracted names; each
        // address can land on at most one person.
        let mut pool = emails;
        for lead in contacts.iter_mut().filter(|l| l.needs_email()) {
            if let Some(email) =
                take_best_match(&mut pool, &lead.name, self.config.match_threshold)
            {
                lead.assign_email(email, EmailStatus::ScrapedFromPage);
            }
        }

        contacts
    }

    /// Browser-rendered extraction with a bounded load-more sweep.
    async fn extract_rendered(
        &self,
        client: &fantoccini::Client,
        url: &str,
        fund_name: &str,
        fund_url: &str,
    ) -> Vec<Lead> {
        let Ok(source) = browser::render_page(client, url, Duration::from_secs(1)).await else {
            return Vec::new();
        };
        if looks_like_missing_page(&source) {
            return Vec::new();
        }

        let mut contacts = self.extract_from_page(&source, url, fund_name, fund_url);

        for _ in 0..self.config.pagination_sweep_limit {
            if !browser::click_by_text(client, LOAD_MORE_LABELS).await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
            if let Ok(expanded) = client.source().await {
                contacts.extend(self.extract_from_page(&expanded, url, fund_name, fund_url));
            }
        }

        contacts
    }
}

/// Derive a display name from the fund's host ("www.acme.vc" -> "Acme").
fn fund_display_name(base: &Url) -> String {
    let host = base.host_str().unwrap_or("");
    let label = host
        .strip_prefix("www.")
        .unwrap_or(host)
        .split('.')
        .next()
        .unwrap_or("");
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Soft-404 detection from the page title.
fn looks_like_missing_page(source: &str) -> bool {
    let doc = Html::parse_document(source);
    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(title) = doc.select(&title_sel).next() {
        let title = title.text().collect::<String>().to_lowercase();
        return title.contains("404") || title.contains("not found");
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn crawler(dir: &std::path::Path) -> DeepCrawler {
        let config = Arc::new(Config {
            output_dir: dir.to_string_lossy().into_owned(),
            ..Config::default()
        });
        let state = Arc::new(
            CrawlStateStore::load(dir.join("state.json"), config.stale_days).unwrap(),
        );
        DeepCrawler::new(config, &VerticalConfig::default(), state, false).unwrap()
    }

    #[test]
    fn target_file_skips_comments_and_duplicates() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets.txt");
        std::fs::write(
            &targets,
            "# seed list\nhttps://acme.vc\n\nhttps://acme.vc\nhttps://other.fund\n",
        )
        .unwrap();

        let crawler = crawler(dir.path());
        let (stale, skipped) = crawler
            .load_targets(targets.to_str().unwrap())
            .unwrap();
        assert_eq!(stale.len(), 2);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn fresh_domains_are_filtered_from_targets() {
        let dir = tempdir().unwrap();
        let targets = dir.path().join("targets.txt");
        std::fs::write(&targets, "https://acme.vc\nhttps://other.fund\n").unwrap();

        let crawler = crawler(dir.path());
        crawler
            .state
            .mark_crawled("https://acme.vc", 10, CrawlStatus::Completed, 20.0);

        let (stale, skipped) = crawler
            .load_targets(targets.to_str().unwrap())
            .unwrap();
        assert_eq!(stale, vec!["https://other.fund".to_string()]);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn team_pages_discovered_by_path_and_anchor_text() {
        let dir = tempdir().unwrap();
        let crawler = crawler(dir.path());
        let base = Url::parse("https://acme.vc").unwrap();
        let html = r#"
            <a href="/team">Our people</a>
            <a href="/portfolio">Portfolio</a>
            <a href="/meet">Meet the team</a>
            <a href="https://twitter.com/acme">Twitter</a>
            <a href="https://other.fund/team">Friends</a>
        "#;
        let urls = crawler.discover_team_pages(html, &base);
        let strs: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
        assert!(strs.contains(&"https://acme.vc/team"));
        assert!(strs.contains(&"https://acme.vc/meet"));
        assert!(!strs.iter().any(|u| u.contains("twitter.com")));
        assert!(!strs.iter().any(|u| u.contains("other.fund")));
        assert!(!strs.iter().any(|u| u.ends_with("/portfolio")));
    }

    #[test]
    fn extraction_merges_names_emails_and_social() {
        let dir = tempdir().unwrap();
        let crawler = crawler(dir.path());
        let source = r#"
            <html><body>
              <div class="team">
                <div><h3>Jane Smith</h3><p>Managing Partner</p></div>
                <div><h3>Bob Jones</h3><p>Principal</p></div>
              </div>
              <footer>
                jane.smith@acme.vc
                <a href="https://linkedin.com/in/janesmith">Jane</a>
              </footer>
            </body></html>
        "#;
        let leads =
            crawler.extract_from_page(source, "https://acme.vc/team", "Acme", "https://acme.vc");
        assert_eq!(leads.len(), 2);

        let jane = leads.iter().find(|l| l.name == "Jane Smith").unwrap();
        assert_eq!(jane.email.as_deref(), Some("jane.smith@acme.vc"));
        assert_eq!(jane.email_status, EmailStatus::ScrapedFromPage);
        assert!(jane.linkedin.as_deref().unwrap().contains("janesmith"));

        let bob = leads.iter().find(|l| l.name == "Bob Jones").unwrap();
        assert!(bob.email.is_none());
    }

    #[test]
    fn orphan_emails_without_names_become_anonymous_contacts() {
        let dir = tempdir().unwrap();
        let crawler = crawler(dir.path());
        let source = r#"<html><body><p>Reach us: deals@acme.vc</p></body></html>"#;
        let leads =
            crawler.extract_from_page(source, "https://acme.vc/contact", "Acme", "https://acme.vc");
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].name, "Unknown");
        assert_eq!(leads[0].email.as_deref(), Some("deals@acme.vc"));
    }

    #[test]
    fn pagination_links_stay_on_site_and_match_page_param() {
        let dir = tempdir().unwrap();
        let crawler = crawler(dir.path());
        let page_url = Url::parse("https://acme.vc/team").unwrap();
        let html = r#"
            <a href="/team?page=2">2</a>
            <a href="/team?page=3">3</a>
            <a href="https://other.fund/team?page=2">elsewhere</a>
            <a href="/about">About</a>
        "#;
        let links = crawler.pagination_links(html, &page_url);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|u| u.as_str().starts_with("https://acme.vc/team?page=")));
    }

    #[test]
    fn soft_404_detected_from_title() {
        assert!(looks_like_missing_page(
            "<html><head><title>404 Not Found</title></head></html>"
        ));
        assert!(looks_like_missing_page(
            "<html><head><title>Page not found | Acme</title></head></html>"
        ));
        assert!(!looks_like_missing_page(
            "<html><head><title>Team | Acme</title></head></html>"
        ));
    }

    #[test]
    fn fund_name_derived_from_host() {
        let base = Url::parse("https://www.sequoia-south.vc/").unwrap();
        assert_eq!(fund_display_name(&base), "Sequoia-south");
    }
}
