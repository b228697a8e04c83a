//! Utility functions for handling domain names and URLs.

use crate::core::error::{AppError, Result};
use url::Url;

/// Extracts the base domain name (e.g., "example.com") from a given URL or domain string.
///
/// Handles common variations:
/// - Adds `https://` scheme if missing.
/// - Parses the URL.
/// - Extracts the host.
/// - Removes common `www.` prefix.
/// - Converts to lowercase.
///
/// Returns `Err(AppError::DomainExtraction)` if the input is empty or a host cannot be parsed.
pub fn get_domain_from_url(website_url_or_domain: &str) -> Result<String> {
    let trimmed_input = website_url_or_domain.trim();
    if trimmed_input.is_empty() {
        tracing::warn!("Received empty input for domain extraction.");
        return Err(AppError::DomainExtraction(
            "Input string is empty".to_string(),
        ));
    }

    let url_str_with_scheme = if !trimmed_input.contains("://") {
        format!("https://{}", trimmed_input)
    } else {
        trimmed_input.to_string()
    };

    let url = match Url::parse(&url_str_with_scheme) {
        Ok(parsed_url) => parsed_url,
        Err(e) => {
            if !trimmed_input.contains('/')
                && trimmed_input.contains('.')
                && !trimmed_input.starts_with('.')
                && !trimmed_input.ends_with('.')
            {
                tracing::debug!(
                    "Input '{}' failed URL parsing but looks like a domain, attempting direct use.",
                    trimmed_input
                );
                let host = trimmed_input.strip_prefix("www.").unwrap_or(trimmed_input);
                return Ok(host.to_lowercase());
            }
            return Err(AppError::UrlParse(e));
        }
    };

    let host = url.host_str().ok_or_else(|| {
        AppError::DomainExtraction(format!("Could not extract host from parsed URL: {}", url))
    })?;

    let domain = host.strip_prefix("www.").unwrap_or(host);
    let final_domain = domain.to_lowercase();

    if !final_domain.contains('.') || final_domain.starts_with('.') || final_domain.ends_with('.') {
        return Err(AppError::DomainExtraction(format!(
            "Extracted domain appears invalid: {}",
            final_domain
        )));
    }

    Ok(final_domain)
}

/// Fallible-but-quiet variant used by enrichment stages: a lead with an
/// unusable website simply does not participate in domain grouping.
pub fn bare_domain(website: &str) -> Option<String> {
    if website.trim().is_empty() || website.trim().eq_ignore_ascii_case("n/a") {
        return None;
    }
    get_domain_from_url(website).ok()
}

/// Parses the input website string into a valid `Url` object.
///
/// Adds `https://` scheme if missing. Useful for ensuring a base URL for crawling.
/// Returns `Err(AppError::UrlParse)` or `Err(AppError::InsufficientInput)` on failure.
pub fn normalize_url(website_url_str: &str) -> Result<Url> {
    let trimmed_input = website_url_str.trim();
    if trimmed_input.is_empty() {
        return Err(AppError::InsufficientInput(
            "Website URL input is empty".to_string(),
        ));
    }

    let url_str_with_scheme = if !trimmed_input.contains("://") {
        format!("https://{}", trimmed_input)
    } else {
        trimmed_input.to_string()
    };

    match Url::parse(&url_str_with_scheme) {
        Ok(url) => {
            if url.host_str().is_none() || url.host_str() == Some("") {
                Err(AppError::UrlParse(url::ParseError::EmptyHost))
            } else {
                Ok(url)
            }
        }
        Err(e) => {
            tracing::debug!(
                "Failed to parse normalized URL '{}' (original: '{}'): {}",
                url_str_with_scheme,
                trimmed_input,
                e
            );
            Err(AppError::UrlParse(e))
        }
    }
}

/// True when two URLs share the same registrable host. The crawler uses
/// this to restrict link-following to the fund's own site.
pub fn same_site(a: &Url, b: &Url) -> bool {
    let host = |u: &Url| {
        u.host_str()
            .map(|h| h.strip_prefix("www.").unwrap_or(h).to_lowercase())
    };
    match (host(a), host(b)) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}

/// Resolve a possibly-relative href against a base URL.
pub fn join_url(base: &Url, href: &str) -> Option<Url> {
    base.join(href).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_domain_from_url_valid() {
        assert_eq!(
            get_domain_from_url("https://www.example.com").unwrap(),
            "example.com"
        );
        assert_eq!(
            get_domain_from_url("http://example.com").unwrap(),
            "example.com"
        );
        assert_eq!(get_domain_from_url("example.com").unwrap(), "example.com");
        assert_eq!(
            get_domain_from_url("www.example.com").unwrap(),
            "example.com"
        );
        assert_eq!(
            get_domain_from_url("https://EXAMPLE.com/path?query=1").unwrap(),
            "example.com"
        );
        assert_eq!(
            get_domain_from_url("http://example.com:8080").unwrap(),
            "example.com"
        );
        assert_eq!(
            get_domain_from_url(" sub.domain.example.co.uk ").unwrap(),
            "sub.domain.example.co.uk"
        );
        assert_eq!(get_domain_from_url("domain.ai").unwrap(), "domain.ai");
    }

    #[test]
    fn test_get_domain_from_url_invalid() {
        assert!(get_domain_from_url("").is_err());
        assert!(get_domain_from_url("   ").is_err());
        assert!(get_domain_from_url("http://").is_err());
        assert!(get_domain_from_url("www.").is_err());
        assert!(get_domain_from_url(".com").is_err());
        assert!(get_domain_from_url("example").is_err());
        assert!(get_domain_from_url("https://example.").is_err());
    }

    #[test]
    fn test_bare_domain_sentinels() {
        assert_eq!(bare_domain("N/A"), None);
        assert_eq!(bare_domain(""), None);
        assert_eq!(bare_domain("https://acme.vc/team"), Some("acme.vc".to_string()));
    }

    #[test]
    fn test_normalize_url_valid() {
        assert_eq!(
            normalize_url("example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert_eq!(
            normalize_url("http://example.com").unwrap().as_str(),
            "http://example.com/"
        );
        assert_eq!(
            normalize_url(" https://example.com ").unwrap().as_str(),
            "https://example.com/"
        );
    }

    #[test]
    fn test_normalize_url_invalid() {
        assert!(normalize_url("").is_err());
        assert!(normalize_url("http://").is_err());
    }

    #[test]
    fn test_same_site_ignores_www() {
        let a = Url::parse("https://www.acme.vc/team").unwrap();
        let b = Url::parse("https://acme.vc/about").unwrap();
        let c = Url::parse("https://linkedin.com/in/someone").unwrap();
        assert!(same_site(&a, &b));
        assert!(!same_site(&a, &c));
    }
}
