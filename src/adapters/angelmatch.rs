//! Adapter for the Angel Match investor directory.

use super::{CardSelectors, SiteAdapter, SiteConfig};
use crate::core::error::{ExtractionError, Result};
use crate::core::models::{EmailStatus, Lead};
use scraper::ElementRef;

/// Angel Match lists individual angels and funds in row-style cards;
/// the investor type ("Angel" / "VC") rides along in the role slot when
/// the site exposes no richer title.
pub struct AngelMatchAdapter {
    selectors: CardSelectors,
}

impl AngelMatchAdapter {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(AngelMatchAdapter {
            selectors: CardSelectors::compile(config, &["name"])?,
        })
    }
}

impl SiteAdapter for AngelMatchAdapter {
    fn name(&self) -> &'static str {
        "angelmatch"
    }

    fn card_selector(&self) -> &scraper::Selector {
        &self.selectors.card
    }

    fn parse_card(&self, card: ElementRef<'_>) -> std::result::Result<Option<Lead>, ExtractionError> {
        let Some(name) = self.selectors.text(card, "name") else {
            return Ok(None);
        };
        if name.len() < 2 {
            return Err(ExtractionError::RejectedName(name));
        }

        let mut lead = Lead::new(
            name,
            self.selectors.text(card, "fund").unwrap_or_default(),
            self.selectors
                .attr(card, "website", "href")
                .unwrap_or_default(),
        );
        lead.role = self
            .selectors
            .text(card, "role")
            .or_else(|| self.selectors.text(card, "investor_type"));
        lead.focus_areas = self.selectors.list(card, "focus_areas");
        lead.stage = self.selectors.text(card, "stage");
        lead.check_size = self.selectors.text(card, "check_size");
        lead.location = self.selectors.text(card, "location");
        lead.linkedin = self.selectors.attr(card, "linkedin", "href");
        if let Some(email) = self.selectors.email(card) {
            lead.assign_email(email, EmailStatus::ScrapedFromPage);
        }

        Ok(Some(lead))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn falls_back_to_investor_type_for_role() {
        let config: SiteConfig = toml::from_str(
            r#"
            adapter = "angelmatch"
            url = "https://angelmatch.io/investors"
            [selectors]
            card = "li.row"
            name = ".name"
            investor_type = ".type"
            location = ".loc"
            "#,
        )
        .unwrap();
        let adapter = AngelMatchAdapter::new(&config).unwrap();

        let html = Html::parse_document(
            r#"<ul><li class="row">
                <span class="name">Bob Jones</span>
                <span class="type">Angel</span>
                <span class="loc">Austin</span>
            </li></ul>"#,
        );
        let card_sel = Selector::parse("li.row").unwrap();
        let card = html.select(&card_sel).next().unwrap();

        let lead = adapter.parse_card(card).unwrap().unwrap();
        assert_eq!(lead.name, "Bob Jones");
        assert_eq!(lead.role.as_deref(), Some("Angel"));
        assert_eq!(lead.location.as_deref(), Some("Austin"));
        assert!(lead.email.is_none());
    }
}
