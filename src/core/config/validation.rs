//! Contains validation logic for the final Config struct.

use super::Config;
use crate::core::error::{AppError, Result};

/// Validates the configuration settings after loading and potential overrides.
/// Mutates the config to clamp values or set defaults where applicable and logical.
/// Internal helper for the builder's `build` method.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    if config.sleep_between_requests.0 < 0.0 || config.sleep_between_requests.1 < 0.0 {
        return Err(AppError::Config(
            "Sleep durations cannot be negative.".to_string(),
        ));
    }
    if config.sleep_between_requests.0 > config.sleep_between_requests.1 {
        tracing::warn!(
            "Min sleep ({:.2}s) > Max sleep ({:.2}s). Setting max sleep = min sleep.",
            config.sleep_between_requests.0,
            config.sleep_between_requests.1
        );
        config.sleep_between_requests.1 = config.sleep_between_requests.0;
    }
    if config.dns_servers.is_empty() {
        tracing::warn!("DNS servers list is empty. Resolver might use system defaults or fail.");
    }
    if config.max_concurrent_domains == 0 {
        tracing::warn!("Max concurrent domains was set to 0. Setting to 1.");
        config.max_concurrent_domains = 1;
    }
    if config.max_smtp_concurrency == 0 {
        tracing::warn!("Max SMTP concurrency was set to 0. Setting to 1.");
        config.max_smtp_concurrency = 1;
    }
    if config.max_verification_attempts == 0 {
        tracing::warn!("Max verification attempts was set to 0. Setting to 1.");
        config.max_verification_attempts = 1;
    }
    if !(0.0..=1.0).contains(&config.match_threshold) {
        tracing::warn!(
            "Match threshold ({}) outside [0,1]. Clamping.",
            config.match_threshold
        );
        config.match_threshold = config.match_threshold.clamp(0.0, 1.0);
    }
    if config.stale_days == 0 {
        tracing::warn!("Stale window of 0 days disables freshness filtering entirely.");
    }
    if config.team_page_limit == 0 {
        tracing::warn!("Team page limit was set to 0. Setting to 1.");
        config.team_page_limit = 1;
    }
    if !config.smtp_sender_email.contains('@') || !config.smtp_sender_email.contains('.') {
        return Err(AppError::Config(format!(
            "Invalid SMTP sender email format: {}",
            config.smtp_sender_email
        )));
    }
    if !config.filings_contact_email.contains('@') {
        return Err(AppError::Config(format!(
            "Filings contact email must be a real address: {}",
            config.filings_contact_email
        )));
    }
    if config.domain_hard_timeout < config.request_timeout {
        tracing::warn!(
            "Domain hard timeout ({:?}) is shorter than the per-request timeout ({:?}); \
             most domains will be cut off mid-page.",
            config.domain_hard_timeout,
            config.request_timeout
        );
    }
    if let Some(ref url) = config.webdriver_url {
        if url.trim().is_empty() {
            config.webdriver_url = None;
        }
    }
    if config.output_dir.trim().is_empty() {
        return Err(AppError::Config("Output directory cannot be empty.".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let mut config = Config::default();
        assert!(validate_config(&mut config).is_ok());
    }

    #[test]
    fn negative_sleep_rejected() {
        let mut config = Config {
            sleep_between_requests: (-1.0, 2.0),
            ..Config::default()
        };
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn inverted_sleep_range_clamped() {
        let mut config = Config {
            sleep_between_requests: (5.0, 1.0),
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.sleep_between_requests, (5.0, 5.0));
    }

    #[test]
    fn zero_concurrency_bumped_to_one() {
        let mut config = Config {
            max_concurrent_domains: 0,
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.max_concurrent_domains, 1);
    }

    #[test]
    fn bad_sender_email_rejected() {
        let mut config = Config {
            smtp_sender_email: "not-an-email".to_string(),
            ..Config::default()
        };
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn match_threshold_clamped() {
        let mut config = Config {
            match_threshold: 3.0,
            ..Config::default()
        };
        validate_config(&mut config).unwrap();
        assert_eq!(config.match_threshold, 1.0);
    }
}
