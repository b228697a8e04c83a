//! Canonical email local-part patterns and name handling.
//!
//! Professional organizations overwhelmingly use one of a small set of
//! local-part construction rules. The guesser learns which rule a domain
//! uses from any known-good sibling email and propagates it; every other
//! module generates candidates in prevalence order from the same table.

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// The eight canonical local-part rules, ordered by prevalence at
/// professional firms. `first.last` leads (Google Workspace and
/// Microsoft 365 default provisioning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailPattern {
    FirstDotLast,
    First,
    FInitialLast,
    FirstLast,
    FInitialDotLast,
    Last,
    FirstUnderscoreLast,
    LastDotFirst,
}

/// Prevalence-ordered table used for candidate generation and detection.
pub const ALL_PATTERNS: [EmailPattern; 8] = [
    EmailPattern::FirstDotLast,
    EmailPattern::First,
    EmailPattern::FInitialLast,
    EmailPattern::FirstLast,
    EmailPattern::FInitialDotLast,
    EmailPattern::Last,
    EmailPattern::FirstUnderscoreLast,
    EmailPattern::LastDotFirst,
];

/// Statistical default when a domain's pattern is unknown.
pub const DEFAULT_PATTERN: EmailPattern = EmailPattern::FirstDotLast;

impl EmailPattern {
    /// Builds the local part for normalized (ascii, lowercase) name parts.
    pub fn local_part(&self, first: &str, last: &str) -> String {
        let f = first.chars().next().map(|c| c.to_string()).unwrap_or_default();
        match self {
            EmailPattern::FirstDotLast => format!("{}.{}", first, last),
            EmailPattern::First => first.to_string(),
            EmailPattern::FInitialLast => format!("{}{}", f, last),
            EmailPattern::FirstLast => format!("{}{}", first, last),
            EmailPattern::FInitialDotLast => format!("{}.{}", f, last),
            EmailPattern::Last => last.to_string(),
            EmailPattern::FirstUnderscoreLast => format!("{}_{}", first, last),
            EmailPattern::LastDotFirst => format!("{}.{}", last, first),
        }
    }

    /// Applies the pattern to a display name, yielding a full address.
    /// Returns `None` when the name cannot be split into first/last.
    pub fn apply(&self, name: &str, domain: &str) -> Option<String> {
        let (first, last) = split_first_last(name)?;
        Some(format!("{}@{}", self.local_part(&first, &last), domain))
    }

    /// Detects which pattern produced a known email for a known person.
    pub fn detect(email: &str, name: &str) -> Option<EmailPattern> {
        let (first, last) = split_first_last(name)?;
        let local = email.split('@').next()?.to_lowercase();
        ALL_PATTERNS
            .into_iter()
            .find(|p| p.local_part(&first, &last) == local)
    }
}

impl fmt::Display for EmailPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EmailPattern::FirstDotLast => "{first}.{last}",
            EmailPattern::First => "{first}",
            EmailPattern::FInitialLast => "{f}{last}",
            EmailPattern::FirstLast => "{first}{last}",
            EmailPattern::FInitialDotLast => "{f}.{last}",
            EmailPattern::Last => "{last}",
            EmailPattern::FirstUnderscoreLast => "{first}_{last}",
            EmailPattern::LastDotFirst => "{last}.{first}",
        };
        f.write_str(s)
    }
}

/// Generates all plausible candidates for a name + domain, in prevalence
/// order. Empty when the name cannot be split.
pub fn generate_candidates(name: &str, domain: &str) -> Vec<String> {
    let Some((first, last)) = split_first_last(name) else {
        return Vec::new();
    };
    if domain.is_empty() || !domain.contains('.') {
        return Vec::new();
    }
    ALL_PATTERNS
        .into_iter()
        .map(|p| format!("{}@{}", p.local_part(&first, &last), domain))
        .collect()
}

/// Lowercases, strips accents (NFKD fold), and keeps only ascii alpha.
pub fn normalize_name_part(part: &str) -> String {
    part.nfkd()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

/// Splits a display name into normalized (first, last). The last
/// whitespace-separated word wins as the surname so middle names and
/// initials fall away.
pub fn split_first_last(name: &str) -> Option<(String, String)> {
    let cleaned = clean_person_name(name);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }
    let first = normalize_name_part(words[0]);
    let last = normalize_name_part(words[words.len() - 1]);
    if first.is_empty() || last.is_empty() {
        return None;
    }
    Some((first, last))
}

/// Words that indicate a company/fund name rather than a person name.
const COMPANY_WORDS: &[&str] = &[
    "capital", "ventures", "partners", "fund", "group", "holdings",
    "management", "investments", "equity", "advisors", "advisory",
    "associates", "labs", "studio", "studios", "foundation",
    "initiative", "institute", "accelerator", "incubator", "llc",
    "inc", "corp", "ltd", "limited", "gmbh", "sa", "ag",
    "news", "our", "the", "about", "additional", "strategic",
    "continuity", "growth", "seed", "series", "demo", "day",
    "portfolio", "companies", "company", "team", "meet", "join",
    "alumni", "network", "community", "program", "programs",
    "scout", "scouts", "bio", "life", "sciences", "games",
    "start", "path", "next", "catalyst", "innovation",
    "development", "fundamentals", "research", "digital",
    "global", "international", "technology", "technologies",
    "operating", "platform", "select", "emerging",
    "twitter", "linkedin", "facebook", "instagram", "youtube",
    "follow", "contact", "apply", "subscribe", "sign", "read",
    "learn", "view", "visit", "more", "blog", "press", "media",
    "on", "in", "at", "for", "to", "of", "an", "by", "from",
    "cookies", "cookie", "functional", "performance", "targeting",
    "marketing", "privacy", "overview", "principles", "core",
    "leadership", "history", "availability", "resources",
    "navigation", "submission", "submissions", "board",
    "shared", "values", "philosophy", "customers", "colleagues",
    "communities", "activity", "putting", "challenging",
    "convention", "smarter", "together", "humbly", "check",
    "your", "every", "stage", "how", "we", "help",
    "startups", "links", "information", "connect",
];

const NAME_PREFIXES: &[&str] = &["Meet ", "About ", "Dr. ", "Prof. "];

/// Strips honorifics and team-page prefixes, trailing periods.
pub fn clean_person_name(name: &str) -> String {
    let mut cleaned = name.trim();
    for prefix in NAME_PREFIXES {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest;
            break;
        }
    }
    cleaned.trim_end_matches('.').trim().to_string()
}

/// True when a string plausibly names a real person rather than a fund,
/// section header, or navigation element. Company-word overlap, digits,
/// all-caps headers, and degenerate lengths all reject.
pub fn is_person_name(name: &str) -> bool {
    if name.is_empty() || name.eq_ignore_ascii_case("n/a") || name.eq_ignore_ascii_case("unknown") {
        return false;
    }
    let cleaned = clean_person_name(name);
    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < 2 || words.len() > 5 {
        return false;
    }
    if words
        .iter()
        .any(|w| COMPANY_WORDS.contains(&w.trim_matches(|c: char| ".,;:".contains(c))))
    {
        return false;
    }
    // All-caps multi-word strings are likely headers, not names
    if cleaned == cleaned.to_uppercase() && words.len() > 2 {
        return false;
    }
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_generated_in_prevalence_order() {
        let candidates = generate_candidates("John Doe", "example.com");
        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates[0], "john.doe@example.com");
        assert_eq!(candidates[1], "john@example.com");
        assert_eq!(candidates[2], "jdoe@example.com");
        assert!(candidates.contains(&"doe.john@example.com".to_string()));
        assert!(candidates.contains(&"john_doe@example.com".to_string()));
    }

    #[test]
    fn candidates_empty_for_unsplittable_or_bad_domain() {
        assert!(generate_candidates("Prince", "example.com").is_empty());
        assert!(generate_candidates("John Doe", "").is_empty());
        assert!(generate_candidates("John Doe", "nodot").is_empty());
    }

    #[test]
    fn detect_round_trips_every_pattern() {
        for pattern in ALL_PATTERNS {
            let email = pattern.apply("John Doe", "example.com").unwrap();
            assert_eq!(
                EmailPattern::detect(&email, "John Doe"),
                Some(pattern),
                "round trip failed for {}",
                pattern
            );
        }
    }

    #[test]
    fn detect_prefers_earlier_pattern_on_ambiguity() {
        // "john@..." matches only the First pattern for a two-word name.
        assert_eq!(
            EmailPattern::detect("john@example.com", "John Doe"),
            Some(EmailPattern::First)
        );
        assert_eq!(EmailPattern::detect("unrelated@example.com", "John Doe"), None);
    }

    #[test]
    fn normalization_strips_accents_and_punctuation() {
        assert_eq!(normalize_name_part("Jérémy"), "jeremy");
        assert_eq!(normalize_name_part("O'Malley"), "omalley");
        assert_eq!(normalize_name_part("Jean-Luc"), "jeanluc");
        assert_eq!(normalize_name_part("  Søren "), "sren");
    }

    #[test]
    fn split_uses_first_and_final_word() {
        assert_eq!(
            split_first_last("Mary Jane van der Berg"),
            Some(("mary".to_string(), "berg".to_string()))
        );
        assert_eq!(split_first_last("Madonna"), None);
    }

    #[test]
    fn split_strips_honorifics() {
        assert_eq!(
            split_first_last("Dr. Jane Smith"),
            Some(("jane".to_string(), "smith".to_string()))
        );
    }

    #[test]
    fn person_name_rejects_companies_and_headers() {
        assert!(is_person_name("Jane Smith"));
        assert!(is_person_name("Jean-Luc O'Malley"));
        assert!(!is_person_name("Acme Capital"));
        assert!(!is_person_name("Our Portfolio"));
        assert!(!is_person_name("OUR INVESTMENT TEAM"));
        assert!(!is_person_name("Jane Smith 2024"));
        assert!(!is_person_name("Unknown"));
        assert!(!is_person_name("N/A"));
        assert!(!is_person_name("Madonna"));
    }

    #[test]
    fn pattern_applies_to_display_name() {
        assert_eq!(
            EmailPattern::FInitialDotLast.apply("Jane Smith", "acme.vc"),
            Some("j.smith@acme.vc".to_string())
        );
        assert_eq!(
            EmailPattern::LastDotFirst.apply("Jane Smith", "acme.vc"),
            Some("smith.jane@acme.vc".to_string())
        );
    }
}
