//! Application configuration.
//!
//! Built through [`ConfigBuilder`]: defaults, then an optional TOML file,
//! then programmatic overrides, then validation. CLI flags map onto
//! builder overrides in `main.rs`.

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;

use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Effective runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Network
    pub request_timeout: Duration,
    /// (min, max) seconds slept between polite-mode requests.
    pub sleep_between_requests: (f32, f32),
    pub user_agent: String,

    // DNS
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    // SMTP
    pub smtp_timeout: Duration,
    pub smtp_sender_email: String,
    pub max_verification_attempts: u32,
    /// Minimum gap between two connections to the *same* mail exchanger.
    pub smtp_host_gap: Duration,
    pub max_smtp_concurrency: usize,

    // Crawler
    pub max_concurrent_domains: usize,
    /// Hard wall-clock budget for one fund-domain crawl, independent of
    /// per-request timeouts.
    pub domain_hard_timeout: Duration,
    /// Aggregate batch budget is this value times the batch size.
    pub batch_timeout_per_domain: Duration,
    pub team_page_limit: usize,
    pub pagination_sweep_limit: usize,
    /// Email-to-name fuzzy match acceptance threshold.
    pub match_threshold: f32,
    /// Freshness window: domains crawled more recently are skipped.
    pub stale_days: u32,

    // Enrichment stage toggles
    pub enable_dns_harvest: bool,
    pub enable_dorking: bool,
    pub enable_avatar_oracle: bool,
    pub enable_keyserver: bool,
    pub enable_commit_miner: bool,
    pub enable_filings: bool,
    pub enable_wayback: bool,
    pub enable_catchall: bool,
    pub enable_smtp_verification: bool,
    pub github_token: Option<String>,
    pub serpapi_key: Option<String>,
    /// EDGAR requires a descriptive User-Agent carrying a contact address.
    pub filings_contact_email: String,

    // Browser
    pub webdriver_url: Option<String>,

    // Files
    pub output_dir: String,
    pub crawl_state_path: String,
    pub scoring_config_path: String,
    pub proxies_config_path: Option<String>,

    // Shared validation data
    pub email_regex: Regex,
    pub generic_email_prefixes: HashSet<String>,

    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            request_timeout: Duration::from_secs(15),
            sleep_between_requests: (0.5, 2.0),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                .to_string(),
            dns_timeout: Duration::from_secs(5),
            dns_servers: vec!["8.8.8.8".into(), "1.1.1.1".into()],
            smtp_timeout: Duration::from_secs(8),
            smtp_sender_email: "verify@lead-sleuth.dev".to_string(),
            max_verification_attempts: 2,
            smtp_host_gap: Duration::from_secs(3),
            max_smtp_concurrency: 4,
            max_concurrent_domains: 10,
            domain_hard_timeout: Duration::from_secs(45),
            batch_timeout_per_domain: Duration::from_secs(50),
            team_page_limit: 8,
            pagination_sweep_limit: 3,
            match_threshold: 0.3,
            stale_days: 7,
            enable_dns_harvest: true,
            enable_dorking: true,
            enable_avatar_oracle: true,
            enable_keyserver: true,
            enable_commit_miner: true,
            enable_filings: true,
            enable_wayback: true,
            enable_catchall: true,
            enable_smtp_verification: true,
            github_token: None,
            serpapi_key: None,
            filings_contact_email: "contact@lead-sleuth.dev".to_string(),
            webdriver_url: None,
            output_dir: "data".to_string(),
            crawl_state_path: "data/crawl_state.json".to_string(),
            scoring_config_path: "config/scoring.toml".to_string(),
            proxies_config_path: None,
            email_regex: Regex::new(r"^[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}$")
                .expect("static email regex"),
            generic_email_prefixes: [
                "info", "contact", "hello", "admin", "support", "team", "office", "press",
                "media", "sales", "marketing", "noreply", "no-reply", "careers", "jobs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            loaded_config_path: None,
        }
    }
}

/// Random polite-mode delay drawn from the configured range.
pub fn get_random_sleep_duration(config: &Config) -> Duration {
    let (min, max) = config.sleep_between_requests;
    let secs = if max > min {
        rand::thread_rng().gen_range(min..max)
    } else {
        min
    };
    Duration::from_secs_f32(secs.max(0.0))
}

/// On-disk TOML representation. Every field is optional; absent fields
/// keep their defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub dns: DnsSection,
    #[serde(default)]
    pub smtp: SmtpSection,
    #[serde(default)]
    pub crawler: CrawlerSection,
    #[serde(default)]
    pub enrichment: EnrichmentSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkSection {
    pub request_timeout: Option<u64>,
    pub min_sleep: Option<f32>,
    pub max_sleep: Option<f32>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DnsSection {
    pub dns_timeout: Option<u64>,
    pub dns_servers: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SmtpSection {
    pub smtp_timeout: Option<u64>,
    pub smtp_sender_email: Option<String>,
    pub max_verification_attempts: Option<u32>,
    pub host_gap_seconds: Option<u64>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CrawlerSection {
    pub max_concurrent_domains: Option<usize>,
    pub domain_hard_timeout: Option<u64>,
    pub batch_timeout_per_domain: Option<u64>,
    pub team_page_limit: Option<usize>,
    pub pagination_sweep_limit: Option<usize>,
    pub match_threshold: Option<f32>,
    pub stale_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnrichmentSection {
    pub enable_dns_harvest: Option<bool>,
    pub enable_dorking: Option<bool>,
    pub enable_avatar_oracle: Option<bool>,
    pub enable_keyserver: Option<bool>,
    pub enable_commit_miner: Option<bool>,
    pub enable_filings: Option<bool>,
    pub enable_wayback: Option<bool>,
    pub enable_catchall: Option<bool>,
    pub enable_smtp_verification: Option<bool>,
    pub github_token: Option<String>,
    pub serpapi_key: Option<String>,
    pub filings_contact_email: Option<String>,
    pub generic_email_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowserSection {
    pub webdriver_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSection {
    pub output_dir: Option<String>,
    pub crawl_state_path: Option<String>,
    pub scoring_config_path: Option<String>,
    pub proxies_config_path: Option<String>,
}

pub(crate) use loading::{apply_file_config, load_config_file};
pub(crate) use validation::validate_config;
