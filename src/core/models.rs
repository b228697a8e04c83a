//! Core data model: leads, email provenance, and run accounting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance of a lead's email address.
///
/// The tag always describes how the *current* value of `Lead::email` came
/// to be. A lead without an email is always `Unverified`; verified tags
/// can only accompany a concrete address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// No email, or an email nothing has vouched for yet.
    #[default]
    Unverified,
    /// Harvested directly from a page (mailto, visible text, data attribute).
    ScrapedFromPage,
    /// Generated from a learned or default local-part pattern.
    PatternGuessed,
    /// Confirmed real by an avatar-service registration probe.
    ConfirmedByOracle,
    /// RCPT TO accepted by the domain's mail exchanger (non-catch-all).
    VerifiedBySmtp,
    /// Generated guess on a catch-all domain: deliverable by construction,
    /// low confidence.
    CatchAllGenerated,
    /// RCPT TO rejected: the address bounces.
    Undeliverable,
}

impl EmailStatus {
    /// Tags that assert the address actually exists.
    pub fn is_positive(self) -> bool {
        matches!(self, EmailStatus::ConfirmedByOracle | EmailStatus::VerifiedBySmtp)
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmailStatus::Unverified => "unverified",
            EmailStatus::ScrapedFromPage => "scraped_from_page",
            EmailStatus::PatternGuessed => "pattern_guessed",
            EmailStatus::ConfirmedByOracle => "confirmed_by_oracle",
            EmailStatus::VerifiedBySmtp => "verified_by_smtp",
            EmailStatus::CatchAllGenerated => "catch_all_generated",
            EmailStatus::Undeliverable => "undeliverable",
        };
        f.write_str(s)
    }
}

/// A single investor contact discovered by a crawl.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Lead {
    pub name: String,
    pub role: Option<String>,
    /// `None` is the "unknown" sentinel; exported as `N/A`.
    pub email: Option<String>,
    pub email_status: EmailStatus,
    pub fund: String,
    pub focus_areas: Vec<String>,
    pub stage: Option<String>,
    pub check_size: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
    pub website: String,
    /// Page the lead was extracted from.
    pub source: String,
    /// RFC 3339 discovery timestamp.
    pub scraped_at: String,
    pub lead_score: u8,
    pub tier: String,
}

impl Lead {
    pub fn new(name: impl Into<String>, fund: impl Into<String>, website: impl Into<String>) -> Self {
        Lead {
            name: name.into(),
            fund: fund.into(),
            website: website.into(),
            ..Default::default()
        }
    }

    /// True when the lead still needs email discovery. Enrichment stages
    /// gate on this, which is what makes the pipeline monotonic: a
    /// resolved email is never revisited by a later discovery stage.
    pub fn needs_email(&self) -> bool {
        self.email.is_none()
    }

    /// Assign a discovered email together with its provenance.
    ///
    /// This is the only mutation path for the email field, so the
    /// email/provenance consistency invariant holds by construction.
    pub fn assign_email(&mut self, email: impl Into<String>, status: EmailStatus) {
        let email = email.into().trim().to_lowercase();
        debug_assert!(email.contains('@'), "assign_email called with non-address '{}'", email);
        self.email = Some(email);
        self.email_status = status;
    }

    /// Drop the email back to the unknown sentinel (used when validation
    /// rejects a scraped value outright).
    pub fn clear_email(&mut self) {
        self.email = None;
        self.email_status = EmailStatus::Unverified;
    }

    /// Case-insensitive (name, fund) identity used for dedup within a run
    /// and against the persisted master dataset.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.name.trim().to_lowercase(),
            self.fund.trim().to_lowercase(),
        )
    }

    /// First/last name split used by pattern generation and fuzzy
    /// matching. Single-word names yield `None`.
    pub fn name_parts(&self) -> Option<(&str, &str)> {
        let mut words = self.name.split_whitespace();
        let first = words.next()?;
        let last = self.name.split_whitespace().last()?;
        if first == last && self.name.split_whitespace().count() < 2 {
            return None;
        }
        Some((first, last))
    }
}

/// Per-run accounting surfaced in the summary: skipped domains,
/// rate-limited calls, and self-disabled subsystems are the operator's
/// first signal that a run degraded.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub domains_targeted: usize,
    pub domains_crawled: usize,
    pub domains_skipped_fresh: usize,
    pub domains_skipped_timeout: usize,
    pub domains_failed: usize,
    pub leads_found: usize,
    pub emails_resolved: usize,
    pub emails_verified: usize,
    pub rate_limited_calls: usize,
    pub tripped_subsystems: Vec<String>,
}

impl RunSummary {
    pub fn record_trip(&mut self, subsystem: &str) {
        if !self.tripped_subsystems.iter().any(|s| s == subsystem) {
            self.tripped_subsystems.push(subsystem.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_email_is_always_unverified() {
        let lead = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        assert!(lead.needs_email());
        assert_eq!(lead.email_status, EmailStatus::Unverified);
    }

    #[test]
    fn assign_email_normalizes_and_tags() {
        let mut lead = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        lead.assign_email(" Jane.Smith@Acme.VC ", EmailStatus::PatternGuessed);
        assert_eq!(lead.email.as_deref(), Some("jane.smith@acme.vc"));
        assert_eq!(lead.email_status, EmailStatus::PatternGuessed);
        assert!(!lead.needs_email());
    }

    #[test]
    fn clear_email_restores_sentinel_state() {
        let mut lead = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        lead.assign_email("jane@acme.vc", EmailStatus::ScrapedFromPage);
        lead.clear_email();
        assert!(lead.email.is_none());
        assert_eq!(lead.email_status, EmailStatus::Unverified);
    }

    #[test]
    fn dedup_key_is_case_insensitive() {
        let a = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        let b = Lead::new("JANE SMITH", "acme ventures", "https://acme.vc");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn name_parts_requires_two_words() {
        let lead = Lead::new("Jane Smith", "Acme", "acme.vc");
        assert_eq!(lead.name_parts(), Some(("Jane", "Smith")));
        let single = Lead::new("Acme", "Acme", "acme.vc");
        assert_eq!(single.name_parts(), None);
    }
}
