//! Industry vertical configuration.
//!
//! A vertical tells the engine what to scrape and how to interpret it:
//! seed sources, team-page keywords, role keywords, and default sector
//! tags. The investor-fund vertical ships as the built-in default;
//! other industries are a TOML file away.

use crate::core::error::{AppError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct VerticalConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub seed_urls: Vec<String>,
    #[serde(default = "default_team_page_keywords")]
    pub team_page_keywords: Vec<String>,
    #[serde(default = "default_role_keywords")]
    pub role_keywords: Vec<String>,
    /// Adapter names this vertical crawls in directory mode.
    #[serde(default)]
    pub adapters: Vec<String>,
    #[serde(default)]
    pub default_check_size: Option<String>,
    #[serde(default)]
    pub default_sectors: Vec<String>,
}

fn default_team_page_keywords() -> Vec<String> {
    [
        "team", "people", "about", "who-we-are", "our-team",
        "partners", "leadership", "staff", "investors", "bios",
        "professionals", "portfolio-team", "our-people", "meet-the-team",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_role_keywords() -> Vec<String> {
    [
        "partner", "principal", "associate", "analyst", "founder",
        "managing", "director", "vice president", "vp", "ceo",
        "cto", "cfo", "coo", "general partner", "venture partner",
        "operating partner", "senior associate", "investment",
        "head of", "chief", "chairman", "advisory", "advisor",
        "eir", "entrepreneur in residence", "scout", "fellow",
        "investor", "member", "operator", "observer", "mentor",
        "board", "team", "staff", "manager", "counsel",
        "secretary", "treasurer", "controller", "intern", "resident",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for VerticalConfig {
    /// The built-in venture-capital vertical.
    fn default() -> Self {
        VerticalConfig {
            name: "Venture Capital".to_string(),
            description: "Venture funds and angel investors".to_string(),
            seed_urls: Vec::new(),
            team_page_keywords: default_team_page_keywords(),
            role_keywords: default_role_keywords(),
            adapters: vec!["openvc".to_string(), "angelmatch".to_string()],
            default_check_size: None,
            default_sectors: Vec::new(),
        }
    }
}

impl VerticalConfig {
    /// Load a vertical definition from a TOML file. An unreadable or
    /// invalid file is fatal for the unit that named it.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!(
                "Vertical config not found: {}",
                path
            )));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Invalid vertical config '{}': {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vertical_has_usable_keyword_lists() {
        let vertical = VerticalConfig::default();
        assert!(vertical.team_page_keywords.iter().any(|k| k == "team"));
        assert!(vertical.role_keywords.iter().any(|k| k == "partner"));
        assert!(!vertical.adapters.is_empty());
    }

    #[test]
    fn custom_vertical_parses_with_defaults_filled() {
        let vertical: VerticalConfig = toml::from_str(
            r#"
            name = "Private Equity"
            seed_urls = ["https://example.com/pe-funds"]
            default_sectors = ["industrials"]
            "#,
        )
        .unwrap();
        assert_eq!(vertical.name, "Private Equity");
        assert_eq!(vertical.seed_urls.len(), 1);
        // Defaults still apply for unspecified keyword lists.
        assert!(vertical.team_page_keywords.iter().any(|k| k == "team"));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(VerticalConfig::load("no/such/vertical.toml").is_err());
    }
}
