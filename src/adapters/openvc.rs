//! Adapter for the OpenVC investor directory.

use super::{CardSelectors, SiteAdapter, SiteConfig};
use crate::core::error::{ExtractionError, Result};
use crate::core::models::{EmailStatus, Lead};
use scraper::ElementRef;

/// OpenVC is an open investor directory with card-based layouts and
/// infinite-scroll pagination.
pub struct OpenVcAdapter {
    selectors: CardSelectors,
}

impl OpenVcAdapter {
    pub fn new(config: &SiteConfig) -> Result<Self> {
        Ok(OpenVcAdapter {
            selectors: CardSelectors::compile(config, &["name"])?,
        })
    }
}

impl SiteAdapter for OpenVcAdapter {
    fn name(&self) -> &'static str {
        "openvc"
    }

    fn card_selector(&self) -> &scraper::Selector {
        &self.selectors.card
    }

    fn parse_card(&self, card: ElementRef<'_>) -> std::result::Result<Option<Lead>, ExtractionError> {
        let Some(name) = self.selectors.text(card, "name") else {
            // Cards without a name heading are layout filler, not people.
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
        lead.role = self.selectors.text(card, "role");
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

    fn adapter() -> OpenVcAdapter {
        let config: SiteConfig = toml::from_str(
            r#"
            adapter = "openvc"
            url = "https://openvc.app/investors"
            [selectors]
            card = "div.investor"
            name = "h3"
            role = ".role"
            fund = ".fund"
            focus_areas = ".tag"
            stage = ".stage"
            check_size = ".check"
            location = ".location"
            linkedin = "a.li"
            website = "a.site"
            email = "a.mail"
            "#,
        )
        .unwrap();
        OpenVcAdapter::new(&config).unwrap()
    }

    #[test]
    fn parses_full_card() {
        let html = Html::parse_document(
            r#"
            <div class="investor">
              <h3>Jane Smith</h3>
              <p class="role">General Partner</p>
              <p class="fund">Acme Ventures</p>
              <span class="tag">fintech</span><span class="tag">saas</span>
              <span class="stage">Seed</span>
              <span class="check">$100K - $500K</span>
              <span class="location">New York</span>
              <a class="li" href="https://linkedin.com/in/janesmith">LinkedIn</a>
              <a class="site" href="https://acme.vc">Site</a>
              <a class="mail" href="mailto:jane@acme.vc">Email</a>
            </div>
            "#,
        );
        let card_sel = Selector::parse("div.investor").unwrap();
        let card = html.select(&card_sel).next().unwrap();

        let lead = adapter().parse_card(card).unwrap().unwrap();
        assert_eq!(lead.name, "Jane Smith");
        assert_eq!(lead.role.as_deref(), Some("General Partner"));
        assert_eq!(lead.fund, "Acme Ventures");
        assert_eq!(lead.focus_areas, vec!["fintech", "saas"]);
        assert_eq!(lead.stage.as_deref(), Some("Seed"));
        assert_eq!(lead.check_size.as_deref(), Some("$100K - $500K"));
        assert_eq!(lead.email.as_deref(), Some("jane@acme.vc"));
        assert_eq!(lead.email_status, EmailStatus::ScrapedFromPage);
        assert_eq!(lead.website, "https://acme.vc");
    }

    #[test]
    fn nameless_card_is_skipped_quietly() {
        let html = Html::parse_document(r#"<div class="investor"><p class="role">Ad</p></div>"#);
        let card_sel = Selector::parse("div.investor").unwrap();
        let card = html.select(&card_sel).next().unwrap();
        assert!(adapter().parse_card(card).unwrap().is_none());
    }
}
