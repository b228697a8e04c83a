//! Offline email validation: format, disposable domains, role prefixes.

use crate::core::config::Config;

/// Known disposable/temporary email domains.
const DISPOSABLE_DOMAINS: &[&str] = &[
    "tempmail.com",
    "throwaway.email",
    "guerrillamail.com",
    "mailinator.com",
    "yopmail.com",
    "trashmail.com",
    "fakeinbox.com",
    "sharklasers.com",
    "grr.la",
    "dispostable.com",
    "10minutemail.com",
];

/// Validation quality grade for an email value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailQuality {
    /// Personal professional address.
    High,
    /// Role-based address (info@, press@): usable but lower priority.
    Medium,
    /// Disposable-domain address.
    Low,
    /// Fails format validation outright.
    Invalid,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub quality: EmailQuality,
    pub is_disposable: bool,
    pub is_role_based: bool,
}

/// Grades a single address without any network traffic.
pub fn validate_email(config: &Config, email: &str) -> ValidationOutcome {
    let mut outcome = ValidationOutcome {
        quality: EmailQuality::Invalid,
        is_disposable: false,
        is_role_based: false,
    };

    let email = email.trim().to_lowercase();
    if email.is_empty() || !config.email_regex.is_match(&email) {
        return outcome;
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return outcome;
    };

    if DISPOSABLE_DOMAINS.contains(&domain) {
        outcome.is_disposable = true;
        outcome.quality = EmailQuality::Low;
        return outcome;
    }

    if config.generic_email_prefixes.contains(local) {
        outcome.is_role_based = true;
        outcome.quality = EmailQuality::Medium;
        return outcome;
    }

    outcome.quality = EmailQuality::High;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn grades_personal_address_high() {
        let outcome = validate_email(&config(), "jane.smith@acme.vc");
        assert_eq!(outcome.quality, EmailQuality::High);
        assert!(!outcome.is_disposable);
        assert!(!outcome.is_role_based);
    }

    #[test]
    fn grades_role_address_medium() {
        let outcome = validate_email(&config(), "info@acme.vc");
        assert_eq!(outcome.quality, EmailQuality::Medium);
        assert!(outcome.is_role_based);
    }

    #[test]
    fn grades_disposable_low() {
        let outcome = validate_email(&config(), "jane@mailinator.com");
        assert_eq!(outcome.quality, EmailQuality::Low);
        assert!(outcome.is_disposable);
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(validate_email(&config(), "").quality, EmailQuality::Invalid);
        assert_eq!(validate_email(&config(), "not-an-email").quality, EmailQuality::Invalid);
        assert_eq!(validate_email(&config(), "a@b").quality, EmailQuality::Invalid);
        assert_eq!(validate_email(&config(), "@acme.vc").quality, EmailQuality::Invalid);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let outcome = validate_email(&config(), "  Jane.Smith@ACME.VC  ");
        assert_eq!(outcome.quality, EmailQuality::High);
    }
}
