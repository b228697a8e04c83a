//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::{apply_file_config, load_config_file, validate_config, Config, ConfigFile};
use crate::core::error::{AppError, Result};
use std::path::Path;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// This is the primary way callers should create a `Config` object.
/// It handles loading from files, applying overrides, and validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn max_concurrent_domains(mut self, value: usize) -> Self {
        self.overrides.crawler.max_concurrent_domains = Some(value);
        self
    }
    pub fn domain_hard_timeout(mut self, duration: Duration) -> Self {
        self.overrides.crawler.domain_hard_timeout = Some(duration.as_secs());
        self
    }
    pub fn stale_days(mut self, days: u32) -> Self {
        self.overrides.crawler.stale_days = Some(days);
        self
    }
    pub fn match_threshold(mut self, value: f32) -> Self {
        self.overrides.crawler.match_threshold = Some(value);
        self
    }
    pub fn sleep_between_requests(mut self, min: f32, max: f32) -> Self {
        self.overrides.network.min_sleep = Some(min);
        self.overrides.network.max_sleep = Some(max);
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.network.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.overrides.network.user_agent = Some(value.into());
        self
    }
    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn smtp_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.smtp_timeout = Some(duration.as_secs());
        self
    }
    pub fn smtp_sender_email(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.smtp_sender_email = Some(value.into());
        self
    }
    pub fn smtp_host_gap(mut self, duration: Duration) -> Self {
        self.overrides.smtp.host_gap_seconds = Some(duration.as_secs());
        self
    }
    pub fn max_verification_attempts(mut self, value: u32) -> Self {
        self.overrides.smtp.max_verification_attempts = Some(value);
        self
    }
    pub fn webdriver_url(mut self, url: Option<impl Into<String>>) -> Self {
        self.overrides.browser.webdriver_url = url.map(|s| s.into());
        self
    }
    pub fn output_dir(mut self, dir: impl Into<String>) -> Self {
        self.overrides.output.output_dir = Some(dir.into());
        self
    }
    pub fn scoring_config(mut self, path: impl Into<String>) -> Self {
        self.overrides.output.scoring_config_path = Some(path.into());
        self
    }
    pub fn proxies_config(mut self, path: Option<impl Into<String>>) -> Self {
        self.overrides.output.proxies_config_path = path.map(|s| s.into());
        self
    }
    pub fn github_token(mut self, token: Option<impl Into<String>>) -> Self {
        self.overrides.enrichment.github_token = token.map(|s| s.into());
        self
    }
    pub fn serpapi_key(mut self, key: Option<impl Into<String>>) -> Self {
        self.overrides.enrichment.serpapi_key = key.map(|s| s.into());
        self
    }
    pub fn enable_dorking(mut self, enable: bool) -> Self {
        self.overrides.enrichment.enable_dorking = Some(enable);
        self
    }
    pub fn enable_catchall(mut self, enable: bool) -> Self {
        self.overrides.enrichment.enable_catchall = Some(enable);
        self
    }
    pub fn enable_smtp_verification(mut self, enable: bool) -> Self {
        self.overrides.enrichment.enable_smtp_verification = Some(enable);
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings,
    /// overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            match load_config_file(path) {
                Ok(file_config) => {
                    apply_file_config(&mut self.config, &file_config);
                    loaded_path = Some(path.clone());
                    tracing::info!("Loaded base configuration from specified file: {}", path);
                }
                Err(e) => {
                    tracing::error!("Failed to load specified config file '{}': {}", path, e);
                    return Err(AppError::Config(format!(
                        "Failed to load specified configuration file '{}': {}",
                        path, e
                    )));
                }
            }
        } else {
            tracing::debug!("No config file specified, checking default locations.");
            for path_str in ["./lead-sleuth.toml", "./config.toml"] {
                if Path::new(path_str).exists() {
                    tracing::debug!("Found potential default config file: {}", path_str);
                    match load_config_file(path_str) {
                        Ok(file_config) => {
                            apply_file_config(&mut self.config, &file_config);
                            loaded_path = Some(path_str.to_string());
                            tracing::info!(
                                "Loaded base configuration from default location: {}",
                                path_str
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Failed to load or parse default config '{}': {}",
                                path_str,
                                e
                            );
                        }
                    }
                }
            }
            if loaded_path.is_none() {
                tracing::info!("No configuration file found. Using default values and overrides.");
            }
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;
        validate_config(&mut self.config)?;

        tracing::debug!("Final configuration built successfully.");
        Ok(self.config)
    }
}
