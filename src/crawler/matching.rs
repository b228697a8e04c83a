//! Deterministic email-to-name association.
//!
//! Pages frequently publish emails that are not structurally tied to a
//! person card. Each orphaned email is scored against each extracted
//! name over the common local-part conventions; the best pairing above
//! the configured threshold wins and the email leaves the candidate
//! pool so no address is ever assigned twice.

use crate::enrichment::patterns::normalize_name_part;

/// Scores how well an email's local part matches a person's name.
/// Returns a 0.0–1.0 confidence.
pub fn match_score(email: &str, name: &str) -> f32 {
    let Some(local) = email.split('@').next() else {
        return 0.0;
    };
    let local = local.to_lowercase();

    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() < 2 {
        return 0.0;
    }
    let first = normalize_name_part(words[0]);
    let last = normalize_name_part(words[words.len() - 1]);
    if first.is_empty() || last.is_empty() {
        return 0.0;
    }
    let f = &first[..1];

    // Exact pattern matches
    if local == format!("{}.{}", first, last) {
        return 1.0;
    }
    if local == format!("{}{}", first, last) || local == format!("{}_{}", first, last) {
        return 0.9;
    }
    if local == format!("{}{}", f, last) || local == format!("{}.{}", f, last) {
        return 0.85;
    }
    if local == first || local == format!("{}.{}", last, first) {
        return 0.8;
    }
    if local == last {
        return 0.6;
    }
    // Partial matches
    if local.contains(&first) && local.contains(&last) {
        return 0.7;
    }
    if local.contains(&last) {
        return 0.5;
    }
    if local.contains(&first) {
        return 0.4;
    }
    0.0
}

/// Removes and returns the best-scoring email for `name` from the pool,
/// provided it clears `threshold`.
pub fn take_best_match(pool: &mut Vec<String>, name: &str, threshold: f32) -> Option<String> {
    let mut best_idx = None;
    let mut best_score = 0.0f32;
    for (idx, email) in pool.iter().enumerate() {
        let score = match_score(email, name);
        if score > best_score {
            best_score = score;
            best_idx = Some(idx);
        }
    }
    match best_idx {
        Some(idx) if best_score >= threshold => Some(pool.remove(idx)),
        _ => None,
    }
}

/// Removes and returns the first pool email whose domain part equals
/// `domain` exactly. Used as the strict fallback when generic addresses
/// (ops@, admin@) remain after name matching.
pub fn take_exact_domain(pool: &mut Vec<String>, domain: &str) -> Option<String> {
    let suffix = format!("@{}", domain);
    let idx = pool.iter().position(|e| e.ends_with(&suffix))?;
    Some(pool.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_first_dot_last_scores_full() {
        assert_eq!(match_score("jane.smith@acme.vc", "Jane Smith"), 1.0);
    }

    #[test]
    fn pattern_ladder_is_ordered() {
        let name = "Jane Smith";
        assert!(match_score("janesmith@acme.vc", name) > match_score("jsmith@acme.vc", name));
        assert!(match_score("jsmith@acme.vc", name) > match_score("jane@acme.vc", name));
        assert!(match_score("jane@acme.vc", name) > match_score("smith@acme.vc", name));
        assert!(match_score("smith@acme.vc", name) > match_score("contact-smith-team@acme.vc", name));
    }

    #[test]
    fn accents_and_punctuation_normalize_before_matching() {
        assert_eq!(match_score("jeremy.leclerc@fonds.fr", "Jérémy Leclerc"), 1.0);
        assert_eq!(match_score("jomalley@acme.vc", "Jean O'Malley"), 0.85);
    }

    #[test]
    fn single_word_names_never_match() {
        assert_eq!(match_score("prince@acme.vc", "Prince"), 0.0);
    }

    #[test]
    fn unrelated_email_scores_zero() {
        assert_eq!(match_score("info@acme.vc", "Jane Smith"), 0.0);
    }

    #[test]
    fn take_best_match_consumes_the_winner() {
        let mut pool = vec![
            "info@acme.vc".to_string(),
            "jane.smith@acme.vc".to_string(),
            "bob@acme.vc".to_string(),
        ];
        let taken = take_best_match(&mut pool, "Jane Smith", 0.3);
        assert_eq!(taken.as_deref(), Some("jane.smith@acme.vc"));
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&"jane.smith@acme.vc".to_string()));
    }

    #[test]
    fn take_best_match_respects_threshold() {
        let mut pool = vec!["info@acme.vc".to_string()];
        assert_eq!(take_best_match(&mut pool, "Jane Smith", 0.3), None);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn no_email_assigned_twice() {
        let mut pool = vec!["jane.smith@acme.vc".to_string()];
        assert!(take_best_match(&mut pool, "Jane Smith", 0.3).is_some());
        assert!(take_best_match(&mut pool, "Jane Smith", 0.3).is_none());
    }

    #[test]
    fn exact_domain_fallback_is_strict() {
        let mut pool = vec![
            "ops@easydmarc.us".to_string(),
            "admin@acme.vc".to_string(),
        ];
        assert_eq!(
            take_exact_domain(&mut pool, "acme.vc").as_deref(),
            Some("admin@acme.vc")
        );
        assert_eq!(take_exact_domain(&mut pool, "acme.vc"), None);
    }
}
