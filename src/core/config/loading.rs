//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Loads configuration settings from a TOML file.
/// Returns the parsed `ConfigFile` content.
/// Internal to the builder logic.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    tracing::debug!("Attempting to parse TOML from: {}", file_path);
    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config`
/// instance. Internal helper for the builder. This merges settings.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // Network
    if let Some(timeout) = file_config.network.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(min_sleep) = file_config.network.min_sleep {
        config.sleep_between_requests.0 = min_sleep;
    }
    if let Some(max_sleep) = file_config.network.max_sleep {
        config.sleep_between_requests.1 = max_sleep;
    }
    if let Some(ref user_agent) = file_config.network.user_agent {
        config.user_agent = user_agent.clone();
    }

    // DNS
    if let Some(timeout) = file_config.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref servers) = file_config.dns.dns_servers {
        if !servers.is_empty() {
            config.dns_servers = servers.clone();
        }
    }

    // SMTP
    if let Some(timeout) = file_config.smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref sender) = file_config.smtp.smtp_sender_email {
        config.smtp_sender_email = sender.clone();
    }
    if let Some(attempts) = file_config.smtp.max_verification_attempts {
        config.max_verification_attempts = attempts;
    }
    if let Some(gap) = file_config.smtp.host_gap_seconds {
        config.smtp_host_gap = Duration::from_secs(gap);
    }
    if let Some(concurrency) = file_config.smtp.max_concurrency {
        config.max_smtp_concurrency = concurrency;
    }

    // Crawler
    if let Some(value) = file_config.crawler.max_concurrent_domains {
        config.max_concurrent_domains = value;
    }
    if let Some(secs) = file_config.crawler.domain_hard_timeout {
        config.domain_hard_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file_config.crawler.batch_timeout_per_domain {
        config.batch_timeout_per_domain = Duration::from_secs(secs);
    }
    if let Some(limit) = file_config.crawler.team_page_limit {
        config.team_page_limit = limit;
    }
    if let Some(limit) = file_config.crawler.pagination_sweep_limit {
        config.pagination_sweep_limit = limit;
    }
    if let Some(threshold) = file_config.crawler.match_threshold {
        config.match_threshold = threshold;
    }
    if let Some(days) = file_config.crawler.stale_days {
        config.stale_days = days;
    }

    // Enrichment
    let e = &file_config.enrichment;
    if let Some(v) = e.enable_dns_harvest {
        config.enable_dns_harvest = v;
    }
    if let Some(v) = e.enable_dorking {
        config.enable_dorking = v;
    }
    if let Some(v) = e.enable_avatar_oracle {
        config.enable_avatar_oracle = v;
    }
    if let Some(v) = e.enable_keyserver {
        config.enable_keyserver = v;
    }
    if let Some(v) = e.enable_commit_miner {
        config.enable_commit_miner = v;
    }
    if let Some(v) = e.enable_filings {
        config.enable_filings = v;
    }
    if let Some(v) = e.enable_wayback {
        config.enable_wayback = v;
    }
    if let Some(v) = e.enable_catchall {
        config.enable_catchall = v;
    }
    if let Some(v) = e.enable_smtp_verification {
        config.enable_smtp_verification = v;
    }
    if let Some(ref token) = e.github_token {
        if !token.trim().is_empty() {
            config.github_token = Some(token.trim().to_string());
        }
    }
    if let Some(ref key) = e.serpapi_key {
        if !key.trim().is_empty() {
            config.serpapi_key = Some(key.trim().to_string());
        }
    }
    if let Some(ref contact) = e.filings_contact_email {
        config.filings_contact_email = contact.clone();
    }
    if let Some(ref prefixes) = e.generic_email_prefixes {
        config.generic_email_prefixes = prefixes.iter().map(|p| p.to_lowercase()).collect();
    }

    // Browser
    if let Some(ref url) = file_config.browser.webdriver_url {
        if !url.trim().is_empty() {
            config.webdriver_url = Some(url.trim().to_string());
        } else {
            config.webdriver_url = None;
        }
    }

    // Output / file locations
    if let Some(ref dir) = file_config.output.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(ref path) = file_config.output.crawl_state_path {
        config.crawl_state_path = path.clone();
    }
    if let Some(ref path) = file_config.output.scoring_config_path {
        config.scoring_config_path = path.clone();
    }
    if let Some(ref path) = file_config.output.proxies_config_path {
        if !path.trim().is_empty() {
            config.proxies_config_path = Some(path.trim().to_string());
        } else {
            config.proxies_config_path = None;
        }
    }
}
