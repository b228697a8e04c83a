//! Lead scoring engine.
//!
//! A pure function of a lead's current attributes — no hidden state —
//! so re-scoring is deterministic. Weights, tier thresholds, and flat
//! modifiers come from `scoring.toml`; operators retune without code
//! changes.

use crate::core::error::{AppError, Result};
use crate::core::models::{EmailStatus, Lead};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// Fixed ordering used for adjacent-stage partial credit.
const STAGE_ORDER: &[&str] = &["pre-seed", "seed", "series-a", "series-b", "growth"];

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub startup_profile: StartupProfile,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub tiers: Tiers,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            startup_profile: StartupProfile::default(),
            weights: Weights::default(),
            tiers: Tiers::default(),
            modifiers: Modifiers::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StartupProfile {
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub target_check_size_min: Option<u64>,
    #[serde(default)]
    pub target_check_size_max: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weights {
    #[serde(default = "default_stage_weight")]
    pub stage_match: i32,
    #[serde(default = "default_sector_weight")]
    pub sector_match: i32,
    #[serde(default = "default_check_weight")]
    pub check_size_fit: i32,
    #[serde(default = "default_portfolio_weight")]
    pub portfolio_relevance: i32,
    #[serde(default = "default_recency_weight")]
    pub recency: i32,
}

fn default_stage_weight() -> i32 {
    30
}
fn default_sector_weight() -> i32 {
    25
}
fn default_check_weight() -> i32 {
    20
}
fn default_portfolio_weight() -> i32 {
    15
}
fn default_recency_weight() -> i32 {
    10
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            stage_match: default_stage_weight(),
            sector_match: default_sector_weight(),
            check_size_fit: default_check_weight(),
            portfolio_relevance: default_portfolio_weight(),
            recency: default_recency_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tier {
    pub min_score: u8,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tiers {
    #[serde(default = "default_hot")]
    pub hot: Tier,
    #[serde(default = "default_warm")]
    pub warm: Tier,
    #[serde(default = "default_cool")]
    pub cool: Tier,
    #[serde(default = "default_cold")]
    pub cold: Tier,
}

fn default_hot() -> Tier {
    Tier { min_score: 80, label: None }
}
fn default_warm() -> Tier {
    Tier { min_score: 60, label: None }
}
fn default_cool() -> Tier {
    Tier { min_score: 40, label: None }
}
fn default_cold() -> Tier {
    Tier { min_score: 0, label: None }
}

impl Default for Tiers {
    fn default() -> Self {
        Tiers {
            hot: default_hot(),
            warm: default_warm(),
            cool: default_cool(),
            cold: default_cold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Modifiers {
    #[serde(default = "default_has_email")]
    pub has_email: i32,
    #[serde(default = "default_verified_email")]
    pub verified_email: i32,
    #[serde(default = "default_has_linkedin")]
    pub has_linkedin: i32,
    #[serde(default = "default_no_email")]
    pub no_email: i32,
    #[serde(default = "default_stale")]
    pub stale: i32,
    /// Days after which a lead's discovery timestamp counts as stale.
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

fn default_has_email() -> i32 {
    10
}
fn default_verified_email() -> i32 {
    5
}
fn default_has_linkedin() -> i32 {
    5
}
fn default_no_email() -> i32 {
    -15
}
fn default_stale() -> i32 {
    -5
}
fn default_stale_after_days() -> i64 {
    30
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers {
            has_email: default_has_email(),
            verified_email: default_verified_email(),
            has_linkedin: default_has_linkedin(),
            no_email: default_no_email(),
            stale: default_stale(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

/// Scores and tiers leads against the configured startup profile.
pub struct LeadScorer {
    config: ScoringConfig,
    amount_re: Regex,
    scores: Vec<u8>,
}

impl LeadScorer {
    pub fn new(config: ScoringConfig) -> Self {
        LeadScorer {
            config,
            amount_re: Regex::new(r"(\d+(?:\.\d+)?)\s*([kKmM]?)").expect("static regex"),
            scores: Vec::new(),
        }
    }

    /// Load from a TOML file; a missing file means defaults.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| AppError::Config(format!("Invalid scoring config '{}': {}", path, e)))?
        } else {
            tracing::info!("Scoring config '{}' not found, using defaults.", path);
            ScoringConfig::default()
        };
        Ok(LeadScorer::new(config))
    }

    /// Score one lead at a fixed evaluation instant. Clamped to [0,100].
    pub fn score_at(&self, lead: &Lead, now: DateTime<Utc>) -> (u8, String) {
        let mut total: i32 = 0;

        total += self.score_stage(lead.stage.as_deref());
        total += self.score_sectors(&lead.focus_areas);
        total += self.score_check_size(lead.check_size.as_deref());
        total += self.score_portfolio(&lead.focus_areas);
        total += self.score_recency(&lead.scraped_at, now);

        // Contact-quality modifiers
        match lead.email {
            Some(_) => {
                total += self.config.modifiers.has_email;
                if lead.email_status.is_positive() {
                    total += self.config.modifiers.verified_email;
                }
                if lead.email_status == EmailStatus::Undeliverable {
                    // A bounced address is as bad as none.
                    total += self.config.modifiers.no_email - self.config.modifiers.has_email;
                }
            }
            None => total += self.config.modifiers.no_email,
        }
        if lead.linkedin.is_some() {
            total += self.config.modifiers.has_linkedin;
        }
        if self.is_stale(&lead.scraped_at, now) {
            total += self.config.modifiers.stale;
        }

        let score = total.clamp(0, 100) as u8;
        (score, self.tier_label(score))
    }

    /// Map a score onto the strict tier threshold ladder.
    pub fn tier_label(&self, score: u8) -> String {
        let tiers = &self.config.tiers;
        if score >= tiers.hot.min_score {
            tiers.hot.label.clone().unwrap_or_else(|| "HOT".to_string())
        } else if score >= tiers.warm.min_score {
            tiers.warm.label.clone().unwrap_or_else(|| "WARM".to_string())
        } else if score >= tiers.cool.min_score {
            tiers.cool.label.clone().unwrap_or_else(|| "COOL".to_string())
        } else {
            tiers.cold.label.clone().unwrap_or_else(|| "COLD".to_string())
        }
    }

    fn score_stage(&self, investor_stage: Option<&str>) -> i32 {
        let weight = self.config.weights.stage_match;
        let my_stage = self.config.startup_profile.stage.to_lowercase();
        let their_stage = investor_stage.unwrap_or("").to_lowercase();

        if their_stage.is_empty() || their_stage == "n/a" {
            return weight / 3; // Unknown = partial credit
        }
        if !my_stage.is_empty()
            && (their_stage.contains(&my_stage) || my_stage.contains(&their_stage))
        {
            return weight;
        }

        let position = |stage: &str| STAGE_ORDER.iter().position(|s| stage.contains(s));
        match (position(&my_stage), position(&their_stage)) {
            (Some(mine), Some(theirs)) => match mine.abs_diff(theirs) {
                0 => weight,
                1 => (weight as f32 * 0.6) as i32,
                2 => (weight as f32 * 0.2) as i32,
                _ => 0,
            },
            _ => weight / 3,
        }
    }

    fn fuzzy_overlap(&self, theirs: &[String]) -> Option<f32> {
        let mine: Vec<String> = self
            .config
            .startup_profile
            .sectors
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        if mine.is_empty() {
            return None;
        }
        let theirs: Vec<String> = theirs.iter().map(|s| s.to_lowercase()).collect();
        let mut overlap = 0usize;
        for my_sector in &mine {
            if theirs
                .iter()
                .any(|t| t.contains(my_sector) || my_sector.contains(t.as_str()))
            {
                overlap += 1;
            }
        }
        Some(overlap as f32 / mine.len() as f32)
    }

    fn score_sectors(&self, investor_sectors: &[String]) -> i32 {
        let weight = self.config.weights.sector_match;
        if investor_sectors.is_empty() {
            return weight / 4; // Unknown = small credit
        }
        match self.fuzzy_overlap(investor_sectors) {
            // Boost partial overlap, cap at full weight
            Some(ratio) => (weight as f32 * (ratio * 1.5).min(1.0)) as i32,
            None => weight / 3,
        }
    }

    fn score_portfolio(&self, investor_sectors: &[String]) -> i32 {
        let weight = self.config.weights.portfolio_relevance;
        if investor_sectors.is_empty() {
            return weight / 4;
        }
        match self.fuzzy_overlap(investor_sectors) {
            Some(ratio) if ratio > 0.0 => (weight as f32 * ratio.min(1.0)) as i32,
            Some(_) => 0,
            None => weight / 3,
        }
    }

    fn score_check_size(&self, check_size: Option<&str>) -> i32 {
        let weight = self.config.weights.check_size_fit;
        let Some(check_size) = check_size else {
            return weight / 3;
        };
        if check_size.is_empty() || check_size.eq_ignore_ascii_case("n/a") {
            return weight / 3;
        }

        let mut amounts: Vec<u64> = Vec::new();
        for caps in self.amount_re.captures_iter(check_size) {
            let base: f64 = caps[1].replace(',', "").parse().unwrap_or(0.0);
            let multiplier = match &caps[2] {
                "k" | "K" => 1_000.0,
                "m" | "M" => 1_000_000.0,
                _ => 1.0,
            };
            amounts.push((base * multiplier) as u64);
        }
        if amounts.is_empty() {
            return weight / 3;
        }

        let inv_min = *amounts.iter().min().expect("non-empty");
        let inv_max = *amounts.iter().max().expect("non-empty");
        let target_min = self.config.startup_profile.target_check_size_min.unwrap_or(0);
        let target_max = self
            .config
            .startup_profile
            .target_check_size_max
            .unwrap_or(u64::MAX);

        if inv_min <= target_max && inv_max >= target_min {
            weight // Ranges overlap = full credit
        } else {
            (weight as f32 * 0.15) as i32
        }
    }

    /// Full credit within a week of discovery, linear decay to zero at
    /// ninety days.
    fn score_recency(&self, scraped_at: &str, now: DateTime<Utc>) -> i32 {
        let weight = self.config.weights.recency;
        let Ok(ts) = DateTime::parse_from_rfc3339(scraped_at) else {
            return weight / 3;
        };
        let age_days = (now - ts.with_timezone(&Utc)).num_days();
        if age_days <= 7 {
            weight
        } else if age_days >= 90 {
            0
        } else {
            let remaining = 1.0 - (age_days - 7) as f32 / 83.0;
            (weight as f32 * remaining) as i32
        }
    }

    fn is_stale(&self, scraped_at: &str, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(scraped_at) {
            Ok(ts) => {
                (now - ts.with_timezone(&Utc)).num_days() > self.config.modifiers.stale_after_days
            }
            Err(_) => false,
        }
    }

    /// Score a batch in place and sort by score descending, with a
    /// deterministic (name, fund) tie-break so exports are stable.
    pub fn score_batch(&mut self, leads: &mut Vec<Lead>) {
        let now = Utc::now();
        for lead in leads.iter_mut() {
            let (score, tier) = self.score_at(lead, now);
            lead.lead_score = score;
            lead.tier = tier;
            self.scores.push(score);
        }
        leads.sort_by(|a, b| {
            b.lead_score
                .cmp(&a.lead_score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.fund.cmp(&b.fund))
        });
    }

    pub fn stats(&self) -> ScorerStats {
        if self.scores.is_empty() {
            return ScorerStats::default();
        }
        let total: u32 = self.scores.iter().map(|&s| s as u32).sum();
        ScorerStats {
            total_scored: self.scores.len(),
            avg_score: total as f32 / self.scores.len() as f32,
            hot_count: self
                .scores
                .iter()
                .filter(|&&s| s >= self.config.tiers.hot.min_score)
                .count(),
            warm_count: self
                .scores
                .iter()
                .filter(|&&s| {
                    s >= self.config.tiers.warm.min_score && s < self.config.tiers.hot.min_score
                })
                .count(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScorerStats {
    pub total_scored: usize,
    pub avg_score: f32,
    pub hot_count: usize,
    pub warm_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> LeadScorer {
        let config: ScoringConfig = toml::from_str(
            r#"
            [startup_profile]
            stage = "seed"
            sectors = ["fintech", "saas"]
            target_check_size_min = 25000
            target_check_size_max = 250000
            "#,
        )
        .unwrap();
        LeadScorer::new(config)
    }

    fn fresh_lead() -> Lead {
        let mut lead = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        lead.scraped_at = Utc::now().to_rfc3339();
        lead
    }

    #[test]
    fn tier_ladder_matches_configured_thresholds() {
        let s = scorer();
        assert_eq!(s.tier_label(85), "HOT");
        assert_eq!(s.tier_label(80), "HOT");
        assert_eq!(s.tier_label(65), "WARM");
        assert_eq!(s.tier_label(45), "COOL");
        assert_eq!(s.tier_label(10), "COLD");
    }

    #[test]
    fn tier_is_monotone_in_score() {
        let s = scorer();
        let rank = |label: &str| match label {
            "COLD" => 0,
            "COOL" => 1,
            "WARM" => 2,
            "HOT" => 3,
            _ => panic!("unknown tier"),
        };
        let mut prev = 0;
        for score in 0..=100u8 {
            let r = rank(&s.tier_label(score));
            assert!(r >= prev, "tier dropped at score {}", score);
            prev = r;
        }
    }

    #[test]
    fn score_is_clamped_to_bounds() {
        let s = scorer();
        let now = Utc::now();
        // Worst case: nothing known, no email, stale.
        let mut lead = Lead::new("Jane Smith", "Acme", "acme.vc");
        lead.scraped_at = (now - chrono::Duration::days(365)).to_rfc3339();
        let (score, _) = s.score_at(&lead, now);
        assert!(score <= 100);

        // Best case: everything matches.
        let mut lead = fresh_lead();
        lead.stage = Some("Seed".to_string());
        lead.focus_areas = vec!["Fintech".to_string(), "SaaS".to_string()];
        lead.check_size = Some("$25K - $100K".to_string());
        lead.linkedin = Some("https://linkedin.com/in/janesmith".to_string());
        lead.assign_email("jane@acme.vc", EmailStatus::VerifiedBySmtp);
        let (score, tier) = s.score_at(&lead, now);
        assert!(score <= 100);
        assert!(score >= 80, "full-match lead scored only {}", score);
        assert_eq!(tier, "HOT");
    }

    #[test]
    fn exact_stage_match_beats_adjacent_beats_distant() {
        let s = scorer();
        let exact = s.score_stage(Some("Seed"));
        let adjacent = s.score_stage(Some("Series-A"));
        let distant = s.score_stage(Some("Series-B"));
        let unknown = s.score_stage(None);
        assert!(exact > adjacent);
        assert!(adjacent > distant);
        assert!(distant > 0);
        assert_eq!(unknown, s.config.weights.stage_match / 3);
    }

    #[test]
    fn sector_overlap_is_boosted_and_capped() {
        let s = scorer();
        let full = s.score_sectors(&["fintech".to_string(), "saas".to_string()]);
        assert_eq!(full, s.config.weights.sector_match);
        let half = s.score_sectors(&["fintech".to_string()]);
        assert!(half > 0 && half < full);
        let none = s.score_sectors(&["biotech".to_string()]);
        assert_eq!(none, 0);
    }

    #[test]
    fn check_size_overlap_gets_full_credit() {
        let s = scorer();
        let overlap = s.score_check_size(Some("$25K - $100K"));
        assert_eq!(overlap, s.config.weights.check_size_fit);
        let disjoint = s.score_check_size(Some("$5M - $20M"));
        assert!(disjoint < overlap);
        assert!(disjoint > 0);
        let unknown = s.score_check_size(None);
        assert_eq!(unknown, s.config.weights.check_size_fit / 3);
    }

    #[test]
    fn missing_email_is_penalized() {
        let s = scorer();
        let now = Utc::now();
        let mut with_email = fresh_lead();
        with_email.assign_email("jane@acme.vc", EmailStatus::PatternGuessed);
        let without_email = fresh_lead();
        let (a, _) = s.score_at(&with_email, now);
        let (b, _) = s.score_at(&without_email, now);
        assert!(a > b);
    }

    #[test]
    fn scoring_is_deterministic() {
        let s = scorer();
        let now = Utc::now();
        let lead = fresh_lead();
        assert_eq!(s.score_at(&lead, now), s.score_at(&lead, now));
    }

    #[test]
    fn batch_sorts_by_score_with_stable_tie_break() {
        let mut s = scorer();
        let mut strong = fresh_lead();
        strong.stage = Some("Seed".to_string());
        strong.focus_areas = vec!["fintech".to_string(), "saas".to_string()];
        strong.check_size = Some("$50K".to_string());
        strong.assign_email("jane@acme.vc", EmailStatus::VerifiedBySmtp);

        let mut weak = Lead::new("Aaron Ames", "Zed Fund", "zed.fund");
        weak.scraped_at = strong.scraped_at.clone();

        let mut weak_twin = Lead::new("Aaron Ames", "Able Fund", "able.fund");
        weak_twin.scraped_at = strong.scraped_at.clone();

        let mut leads = vec![weak.clone(), strong.clone(), weak_twin.clone()];
        s.score_batch(&mut leads);

        assert_eq!(leads[0].name, "Jane Smith");
        // Tie between the two Aarons: fund ascending breaks it.
        assert_eq!(leads[1].fund, "Able Fund");
        assert_eq!(leads[2].fund, "Zed Fund");
    }

    #[test]
    fn scenario_thresholds_classify_hot_and_warm() {
        let s = scorer();
        assert_eq!(s.tier_label(85), "HOT");
        assert_eq!(s.tier_label(65), "WARM");
    }
}
