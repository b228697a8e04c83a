//! Directory-site crawl orchestrator.
//!
//! Wires site configs to registered adapters, hands each site a fresh
//! fingerprinted browser session (optionally proxied), and drives the
//! pagination framework. Per-site failures are contained: one broken
//! site config or one dead site never aborts the run.

use crate::adapters::{build_adapter, PaginationDriver, SitesFile};
use crate::browser;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::models::Lead;
use crate::stealth::{FingerprintManager, HumanBehavior, ProxyManager};

use std::sync::Arc;

/// Per-site outcome for the run summary.
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub site: String,
    pub leads: usize,
    pub cards_failed: usize,
    pub error: Option<String>,
}

pub struct CrawlEngine {
    config: Arc<Config>,
    sites: SitesFile,
    fingerprints: FingerprintManager,
    behavior: HumanBehavior,
    proxies: ProxyManager,
}

impl CrawlEngine {
    pub fn new(config: Arc<Config>, sites_path: &str) -> Result<Self> {
        let sites = SitesFile::load(sites_path)?;
        let proxies = ProxyManager::from_file(config.proxies_config_path.as_deref())?;
        tracing::info!(
            "Crawl engine initialized: {} sites configured, proxying {} (provider: {})",
            sites.sites.len(),
            if proxies.enabled { "on" } else { "off" },
            proxies.provider(),
        );
        Ok(CrawlEngine {
            config,
            sites,
            fingerprints: FingerprintManager::new(),
            behavior: HumanBehavior::default(),
            proxies,
        })
    }

    /// Crawl all enabled sites (or one specific site), collecting every
    /// extracted lead.
    pub async fn run(&self, only_site: Option<&str>) -> Result<(Vec<Lead>, Vec<SiteOutcome>)> {
        if let Some(requested) = only_site {
            if !self.sites.sites.contains_key(requested) {
                let mut available: Vec<&str> =
                    self.sites.sites.keys().map(String::as_str).collect();
                available.sort();
                return Err(crate::core::error::AppError::Config(format!(
                    "Site '{}' not found in config. Available: {}",
                    requested,
                    available.join(", ")
                )));
            }
        }

        let mut all_leads = Vec::new();
        let mut outcomes = Vec::new();

        // Deterministic site order keeps runs comparable.
        let mut names: Vec<&String> = self.sites.sites.keys().collect();
        names.sort();

        for name in names {
            if let Some(requested) = only_site {
                if name != requested {
                    continue;
                }
            }
            let site_config = &self.sites.sites[name];
            if !site_config.enabled {
                tracing::info!("Skipping {} (disabled)", name);
                continue;
            }

            match self.crawl_site(name, site_config).await {
                Ok((leads, cards_failed)) => {
                    tracing::info!("{}: {} leads extracted", name, leads.len());
                    outcomes.push(SiteOutcome {
                        site: name.clone(),
                        leads: leads.len(),
                        cards_failed,
                        error: None,
                    });
                    all_leads.extend(leads);
                }
                Err(e) => {
                    tracing::error!("Error crawling {}: {}", name, e);
                    outcomes.push(SiteOutcome {
                        site: name.clone(),
                        leads: 0,
                        cards_failed: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok((all_leads, outcomes))
    }

    /// Crawl one site with a fresh browser identity. The session is
    /// exclusively owned by this call for its whole duration.
    async fn crawl_site(
        &self,
        site_name: &str,
        site_config: &crate::adapters::SiteConfig,
    ) -> Result<(Vec<Lead>, usize)> {
        let adapter = build_adapter(site_config)?;

        let fingerprint = self.fingerprints.generate();
        let proxy = self.proxies.get_proxy(site_name);
        tracing::debug!(
            "Initializing browser for {} (UA: {}, proxy: {})",
            site_name,
            fingerprint.user_agent,
            proxy.as_ref().map(|p| p.server.as_str()).unwrap_or("none"),
        );

        let client = browser::create_client(&self.config, &fingerprint, proxy.as_ref()).await?;

        let card_selector = adapter.card_selector().clone();
        let driver = PaginationDriver::new(adapter.as_ref(), site_config, &self.behavior, card_selector);
        let result = driver.run(&client).await;

        if self.sites.defaults.screenshots {
            self.capture_screenshot(&client, site_name).await;
        }

        browser::close_client(client, &format!("[{}]", site_name)).await;

        result
    }

    /// Best-effort full-page screenshot of the site's final state.
    async fn capture_screenshot(&self, client: &fantoccini::Client, site_name: &str) {
        match client.screenshot().await {
            Ok(png) => {
                let dir = std::path::PathBuf::from(&self.config.output_dir).join("screenshots");
                if let Err(e) = std::fs::create_dir_all(&dir) {
                    tracing::debug!("Could not create screenshot dir: {}", e);
                    return;
                }
                let path = dir.join(format!(
                    "{}_{}.png",
                    site_name,
                    chrono::Utc::now().format("%Y%m%d_%H%M%S")
                ));
                match std::fs::write(&path, png) {
                    Ok(()) => tracing::info!("Screenshot saved to {}", path.display()),
                    Err(e) => tracing::debug!("Could not write screenshot: {}", e),
                }
            }
            Err(e) => {
                tracing::debug!("Screenshot capture failed for {}: {}", site_name, e);
            }
        }
    }

    pub fn fingerprint_stats(&self) -> crate::stealth::fingerprint::FingerprintStats {
        self.fingerprints.stats()
    }

    pub fn proxied_requests(&self) -> usize {
        self.proxies.total_requests_proxied()
    }
}
