//! Layered team-page extraction heuristics.
//!
//! Three independent harvesters run over every candidate page and their
//! outputs are merged: a structural name/role heuristic, an email
//! harvester (mailto links, data attributes, visible text, raw markup,
//! obfuscation patterns), and a social-profile harvester. All of them
//! are offline functions over parsed HTML so they are cheap to test.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

/// Substrings that mark an extracted "email" as tooling noise rather
/// than a person's address.
const JUNK_EMAIL_MARKERS: &[&str] = &[
    ".png", ".jpg", ".svg", ".gif", ".css", ".js", "example.com", "email.com",
    "domain.com", "sentry.io", "wixpress", "sentry-next", "@2x", "@3x",
];

/// Phrases that are definitely not person names: locations, navigation,
/// section headers, cookie banners, slogans.
const NAME_BLOCKLIST: &[&str] = &[
    // Cities / locations
    "san francisco", "new york", "palo alto", "los angeles", "boston",
    "chicago", "austin", "seattle", "menlo park", "silicon valley",
    "mountain view", "tel aviv", "london", "berlin", "toronto",
    "hong kong", "singapore", "beijing", "shanghai", "mumbai",
    // Navigation / UI
    "helpful tips", "read more", "learn more", "contact us", "get started",
    "sign up", "log in", "about us", "who we are", "what we do",
    "how it works", "join us", "careers", "open positions",
    "view all", "see more", "load more", "subscribe", "follow us",
    "main navigation", "quick links", "site map", "back top",
    "check availability", "founder resources", "submit application",
    // Section headers
    "our portfolio", "our approach", "our story", "our mission",
    "our values", "our focus", "our team", "our people",
    "our philosophy", "our leadership", "our customers",
    "our colleagues", "our communities", "our shared values",
    "latest news", "press releases", "recent investments",
    "portfolio companies", "featured",
    "investment team", "advisory board", "advisory team",
    "investment activity", "core principles",
    "company history", "putting our",
    // Cookie / privacy banners
    "functional cookies", "performance cookies", "targeting cookies",
    "marketing cookies", "privacy overview", "privacy policy",
    "terms of service", "cookie policy", "cookie settings",
    // Slogans / taglines
    "smarter together", "humbly open-minded", "challenging convention",
    "we invest in", "how we help", "our startups",
    "our blog", "connect with us", "links you may",
    "more from", "additional information",
];

/// Words that appear in job titles but not in person names.
const JOB_TITLE_WORDS: &[&str] = &[
    "officer", "manager", "director", "engineer", "specialist",
    "accountant", "analyst", "coordinator", "administrator",
    "president", "vice", "senior", "junior", "associate",
    "lead", "chief", "head", "staff", "principal",
    "marketing", "operations", "technology", "financial",
    "reporting", "portfolio", "accounting", "product",
    "investment", "full", "stack", "fund",
];

const NON_NAME_STARTERS: &[&str] = &[
    "the", "a", "an", "our", "your", "my", "this", "that",
    "we", "how", "set", "more", "about", "meet",
];

/// Location names that leak into role text on structured team pages.
const ROLE_LOCATION_NOISE: &[&str] = &[
    "Bay Area", "San Francisco", "New York", "Palo Alto", "Boston",
    "London", "Berlin", "Tel Aviv", "Singapore", "Beijing", "Shanghai",
    "Los Angeles", "Chicago", "Austin", "Seattle", "Menlo Park",
    "Mountain View", "Toronto", "Mumbai", "Bangalore", "Bengaluru",
];

/// A (name, role) pair lifted from a team page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRole {
    pub name: String,
    pub role: Option<String>,
}

/// Compiled selectors and regexes for one crawl. Role keywords come from
/// the active vertical so the same heuristics serve VC, PE, or any other
/// industry configuration.
pub struct TeamPageExtractor {
    role_keywords: Vec<String>,
    email_re: Regex,
    obfuscated_at_re: Vec<Regex>,
    team_css_re: Regex,
    anchor_sel: Selector,
    any_sel: Selector,
    heading_sel: Selector,
    container_sel: Selector,
}

impl TeamPageExtractor {
    pub fn new(role_keywords: &[String]) -> Self {
        TeamPageExtractor {
            role_keywords: role_keywords.iter().map(|k| k.to_lowercase()).collect(),
            email_re: Regex::new(r"[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}")
                .expect("static email regex"),
            obfuscated_at_re: vec![
                Regex::new(r"(?i)([a-zA-Z0-9._%+-]+)\s*\[at\]\s*([a-zA-Z0-9.-]+)\s*(?:\[dot\]|\.)\s*([a-zA-Z]{2,15})")
                    .expect("static regex"),
                Regex::new(r"(?i)([a-zA-Z0-9._%+-]+)\s*\(at\)\s*([a-zA-Z0-9.-]+)\s*(?:\(dot\)|\.)\s*([a-zA-Z]{2,15})")
                    .expect("static regex"),
                Regex::new(r"([a-zA-Z0-9._%+-]+)\s+@\s+([a-zA-Z0-9.-]+)\s*\.\s*([a-zA-Z]{2,15})")
                    .expect("static regex"),
            ],
            team_css_re: Regex::new(r"(?i)team|member|person|staff|bio|people").expect("static regex"),
            anchor_sel: Selector::parse("a[href]").expect("static selector"),
            any_sel: Selector::parse("*").expect("static selector"),
            heading_sel: Selector::parse("h2, h3, h4, h5, h6, strong").expect("static selector"),
            container_sel: Selector::parse("div, li, article").expect("static selector"),
        }
    }

    // ── Email harvesting ─────────────────────────────────────────────

    /// Extract emails from every source in a page: mailto links, data
    /// attributes, visible text, raw markup, and obfuscation patterns.
    pub fn harvest_emails(&self, doc: &Html, raw_html: &str) -> Vec<String> {
        let mut emails: HashSet<String> = HashSet::new();

        // 1. mailto: links (highest signal: intentionally published)
        for a in doc.select(&self.anchor_sel) {
            if let Some(href) = a.value().attr("href") {
                if let Some(rest) = href.strip_prefix("mailto:") {
                    let raw = rest.split('?').next().unwrap_or("").trim();
                    if raw.contains('@') && raw.rsplit('@').next().is_some_and(|d| d.contains('.')) {
                        emails.insert(raw.to_lowercase());
                    }
                }
            }
        }

        // 2. data attributes that commonly hold emails
        for el in doc.select(&self.any_sel) {
            for attr in ["data-email", "data-mail", "data-contact", "data-href"] {
                if let Some(value) = el.value().attr(attr) {
                    if value.contains('@') && value.contains('.') {
                        emails.insert(value.trim().to_lowercase());
                    }
                }
            }
        }

        // 3. Visible text regex
        let page_text = visible_text(doc);
        for m in self.email_re.find_iter(&page_text) {
            emails.insert(clean_extracted_email(m.as_str()));
        }

        // 4. Raw markup regex (JS vars, hidden spans, attributes)
        for m in self.email_re.find_iter(raw_html) {
            emails.insert(clean_extracted_email(m.as_str()));
        }

        // 5. Obfuscation patterns ("name [at] domain [dot] com")
        for re in &self.obfuscated_at_re {
            for caps in re.captures_iter(&page_text) {
                let local = &caps[1];
                let host = &caps[2];
                let tld = &caps[3];
                emails.insert(format!("{}@{}.{}", local, host, tld).to_lowercase());
            }
        }

        let mut filtered: Vec<String> = emails
            .into_iter()
            .filter(|e| !is_junk_email(e))
            .collect();
        filtered.sort();
        filtered
    }

    /// Extract social profile URLs (LinkedIn) with tracking params removed.
    pub fn harvest_social(&self, doc: &Html) -> Vec<String> {
        let mut urls: HashSet<String> = HashSet::new();
        for a in doc.select(&self.anchor_sel) {
            if let Some(href) = a.value().attr("href") {
                if href.contains("linkedin.com/in/") {
                    let clean = href.split('?').next().unwrap_or(href);
                    urls.insert(clean.to_string());
                }
            }
        }
        let mut sorted: Vec<String> = urls.into_iter().collect();
        sorted.sort();
        sorted
    }

    // ── Name / role extraction ───────────────────────────────────────

    /// Extract (name, role) pairs using layered strategies, deduplicated
    /// by name in discovery order.
    pub fn name_role_pairs(&self, doc: &Html) -> Vec<NameRole> {
        let mut pairs: Vec<NameRole> = Vec::new();

        // Strategy 0: CSS class/id hints (team, member, person, bio...)
        for el in doc.select(&self.any_sel) {
            let class_hit = el
                .value()
                .attr("class")
                .is_some_and(|c| self.team_css_re.is_match(c));
            let id_hit = el
                .value()
                .attr("id")
                .is_some_and(|i| self.team_css_re.is_match(i));
            if !class_hit && !id_hit {
                continue;
            }
            let Some(heading) = el.select(&self.heading_sel).next() else {
                continue;
            };
            let name_text = element_text(&heading);
            if !looks_like_name(&name_text) {
                continue;
            }
            let role = self
                .find_role_nearby(&heading, true)
                .or_else(|| self.find_role_nearby(&heading, false));
            pairs.push(NameRole { name: name_text, role });
        }

        // Strategy 1: structured cards — heading plus role text nearby.
        // A card only counts when a role was actually found.
        for container in doc.select(&self.container_sel) {
            let container_text_len: usize = container.text().map(str::len).sum();
            // Skip page wrappers
            if container_text_len > 20_000 {
                continue;
            }
            let Some(heading) = container.select(&self.heading_sel).next() else {
                continue;
            };
            let name_text = element_text(&heading);
            if !looks_like_name(&name_text) {
                continue;
            }
            if let Some(role) = self.find_role_nearby(&heading, true) {
                pairs.push(NameRole {
                    name: name_text,
                    role: Some(role),
                });
            }
        }

        // Strategy 2: relaxed — names without the role requirement, used
        // only when the stricter passes found nothing on the page.
        if pairs.is_empty() {
            for container in doc.select(&self.container_sel) {
                let container_text_len: usize = container.text().map(str::len).sum();
                if container_text_len > 20_000 {
                    continue;
                }
                let Some(heading) = container.select(&self.heading_sel).next() else {
                    continue;
                };
                let name_text = element_text(&heading);
                if !looks_like_name(&name_text) {
                    continue;
                }
                let role = self.find_role_nearby(&heading, false);
                pairs.push(NameRole { name: name_text, role });
            }
        }

        // Deduplicate by name, first occurrence wins
        let mut seen: HashSet<String> = HashSet::new();
        pairs.retain(|p| seen.insert(p.name.clone()));
        pairs
    }

    /// Search up to 3 following siblings and the heading's parent
    /// container for role-like text.
    fn find_role_nearby(&self, heading: &ElementRef, require_keyword: bool) -> Option<String> {
        let mut candidates: Vec<ElementRef> = Vec::new();
        candidates.extend(
            heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .take(3),
        );
        if let Some(parent) = heading.parent().and_then(ElementRef::wrap) {
            for child in parent.children().filter_map(ElementRef::wrap) {
                if child.id() != heading.id() {
                    candidates.push(child);
                }
            }
        }

        for elem in candidates {
            let raw = element_text(&elem);
            let Some(candidate) = clean_role_text(&raw) else {
                continue;
            };
            if candidate.len() >= 80 {
                continue;
            }
            // Off-by-one guard: the "role" is actually the next person's name
            if self.role_is_actually_a_name(&candidate) {
                continue;
            }
            let lower = candidate.to_lowercase();
            if require_keyword {
                if self.role_keywords.iter().any(|kw| lower.contains(kw)) {
                    return Some(candidate);
                }
            } else if candidate.len() > 3 && candidate.len() < 60 {
                return Some(candidate);
            }
        }
        None
    }

    fn role_is_actually_a_name(&self, role_text: &str) -> bool {
        if !looks_like_name(role_text) {
            return false;
        }
        let lower = role_text.to_lowercase();
        !self.role_keywords.iter().any(|kw| lower.contains(kw))
    }
}

/// Full visible text of a document with whitespace collapsed.
pub fn visible_text(doc: &Html) -> String {
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True for extracted strings that are asset paths, tracker addresses,
/// or placeholder domains rather than a person's email.
pub fn is_junk_email(email: &str) -> bool {
    let email = email.to_lowercase();
    if email.len() > 60 || email.len() < 5 {
        return true;
    }
    JUNK_EMAIL_MARKERS.iter().any(|m| email.contains(m))
}

/// Repairs an email that picked up adjacent page text during regex
/// extraction. Digit runs glued to the front of the local part are
/// stripped, and camelCase text glued to the TLD ("site.comLinkedIn")
/// is cut at the case transition.
pub fn clean_extracted_email(raw: &str) -> String {
    let Some((local, domain)) = raw.rsplit_once('@') else {
        return raw.to_lowercase();
    };

    let mut local = local.trim_start_matches(|c: char| c.is_ascii_digit());
    if local.is_empty() {
        local = raw.rsplit_once('@').map(|(l, _)| l).unwrap_or(raw);
    }

    let domain = match domain.rsplit_once('.') {
        Some((base, tld)) => {
            let chars: Vec<char> = tld.chars().collect();
            let mut clean_len = chars.len();
            for i in 1..chars.len() {
                if chars[i].is_ascii_uppercase() && chars[i - 1].is_ascii_lowercase() {
                    clean_len = i;
                    break;
                }
            }
            let mut clean_tld: String = chars[..clean_len].iter().collect();
            // Cap at 15 chars (longest real TLD)
            if clean_tld.len() > 15 {
                clean_tld.truncate(3);
            }
            format!("{}.{}", base, clean_tld)
        }
        None => domain.to_string(),
    };

    format!("{}@{}", local, domain).to_lowercase()
}

/// Cleans garbled role text lifted from structured team-page HTML
/// ("Based InBay AreaSpecialtyFintech" → "Fintech"). Returns `None` when
/// nothing useful remains.
pub fn clean_role_text(raw: &str) -> Option<String> {
    // Space out camelCase boundaries
    let mut text = String::with_capacity(raw.len() + 8);
    let chars: Vec<char> = raw.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() && chars[i - 1].is_lowercase() {
            text.push(' ');
        }
        text.push(c);
    }

    // Structural prefixes from team page templates
    for noise in [
        "Based In", "Specialty", "Specialists", "Specialist", "Focus",
        "Location", "Office:", "Office", "Region",
    ] {
        text = text.replace(noise, " ");
    }
    if text.is_ascii() {
        for loc in ROLE_LOCATION_NOISE {
            if let Some(idx) = text.to_lowercase().find(&loc.to_lowercase()) {
                text.replace_range(idx..idx + loc.len(), "");
            }
        }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() < 3 {
        return None;
    }
    Some(collapsed)
}

/// True when text plausibly names a real person on a team page.
pub fn looks_like_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 || words.len() > 5 {
        return false;
    }
    if text.len() > 40 || text.len() < 4 {
        return false;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = text.to_lowercase();
    if NAME_BLOCKLIST.iter().any(|blocked| lower.contains(blocked)) {
        return false;
    }
    // Two or more job-title words means a title, not a name
    let lower_words: HashSet<&str> = lower.split_whitespace().collect();
    let title_overlap = lower_words
        .into_iter()
        .filter(|w| JOB_TITLE_WORDS.contains(w))
        .count();
    if title_overlap >= 2 {
        return false;
    }
    if NON_NAME_STARTERS.contains(&words[0].to_lowercase().as_str()) {
        return false;
    }
    for word in &words {
        let cleaned: String = word
            .chars()
            .filter(|c| !"-.'\u{2019}".contains(*c))
            .collect();
        if cleaned.is_empty() {
            return false;
        }
        if !cleaned.chars().next().unwrap().is_uppercase() {
            return false;
        }
        if !cleaned.chars().all(char::is_alphabetic) {
            return false;
        }
    }
    // Single-character first or last names are junk
    if words[0].len() < 2 || words[words.len() - 1].len() < 2 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TeamPageExtractor {
        let keywords: Vec<String> = [
            "partner", "principal", "associate", "analyst", "founder",
            "managing", "director", "ceo", "cto", "head of", "investor",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        TeamPageExtractor::new(&keywords)
    }

    #[test]
    fn harvests_mailto_and_text_emails() {
        let html = r#"
            <html><body>
              <a href="mailto:jane.smith@acme.vc?subject=hi">Email Jane</a>
              <p>Reach bob at bob@acme.vc for deals.</p>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let emails = extractor().harvest_emails(&doc, html);
        assert!(emails.contains(&"jane.smith@acme.vc".to_string()));
        assert!(emails.contains(&"bob@acme.vc".to_string()));
    }

    #[test]
    fn harvests_data_attributes_and_obfuscation() {
        let html = r#"
            <html><body>
              <div data-email="carol@acme.vc">Carol</div>
              <p>dave [at] acme [dot] vc</p>
              <p>erin (at) acme.vc</p>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let emails = extractor().harvest_emails(&doc, html);
        assert!(emails.contains(&"carol@acme.vc".to_string()));
        assert!(emails.contains(&"dave@acme.vc".to_string()));
        assert!(emails.contains(&"erin@acme.vc".to_string()));
    }

    #[test]
    fn filters_asset_and_placeholder_addresses() {
        let html = r#"
            <html><body>
              <p>icon@2x.png someone@example.com real@acme.vc</p>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let emails = extractor().harvest_emails(&doc, html);
        assert_eq!(emails, vec!["real@acme.vc".to_string()]);
    }

    #[test]
    fn cleans_tld_concatenation() {
        assert_eq!(clean_extracted_email("jane@acme.vcFollow"), "jane@acme.vc");
        assert_eq!(clean_extracted_email("jane@site.comLinkedIn"), "jane@site.com");
        assert_eq!(clean_extracted_email("3007jane@acme.vc"), "jane@acme.vc");
        assert_eq!(clean_extracted_email("jane@acme.vc"), "jane@acme.vc");
    }

    #[test]
    fn extracts_card_name_role_pairs() {
        let html = r#"
            <html><body>
              <div class="grid">
                <div><h3>Jane Smith</h3><p>Managing Partner</p></div>
                <div><h3>Bob Jones</h3><p>Principal</p></div>
                <div><h3>Our Portfolio</h3><p>Companies we back</p></div>
              </div>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let pairs = extractor().name_role_pairs(&doc);
        let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"Jane Smith"));
        assert!(names.contains(&"Bob Jones"));
        assert!(!names.contains(&"Our Portfolio"));
        let jane = pairs.iter().find(|p| p.name == "Jane Smith").unwrap();
        assert_eq!(jane.role.as_deref(), Some("Managing Partner"));
    }

    #[test]
    fn css_class_strategy_finds_members_without_role_keywords() {
        let html = r#"
            <html><body>
              <div class="team-member">
                <h4>Alice Wong</h4>
                <span>Fintech</span>
              </div>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let pairs = extractor().name_role_pairs(&doc);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "Alice Wong");
        assert_eq!(pairs[0].role.as_deref(), Some("Fintech"));
    }

    #[test]
    fn relaxed_strategy_only_when_nothing_found() {
        // No role text anywhere: strict passes find nothing, relaxed kicks in.
        let html = r#"
            <html><body>
              <div><h3>Jane Smith</h3></div>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let pairs = extractor().name_role_pairs(&doc);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "Jane Smith");
        assert_eq!(pairs[0].role, None);
    }

    #[test]
    fn dedups_pairs_by_name() {
        let html = r#"
            <html><body>
              <div class="team"><h3>Jane Smith</h3><p>Partner</p></div>
              <div><h3>Jane Smith</h3><p>Partner</p></div>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let pairs = extractor().name_role_pairs(&doc);
        assert_eq!(pairs.iter().filter(|p| p.name == "Jane Smith").count(), 1);
    }

    #[test]
    fn harvests_linkedin_profiles_without_tracking() {
        let html = r#"
            <html><body>
              <a href="https://www.linkedin.com/in/janesmith?trk=page">Jane</a>
              <a href="https://twitter.com/janesmith">Jane</a>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let urls = extractor().harvest_social(&doc);
        assert_eq!(urls, vec!["https://www.linkedin.com/in/janesmith".to_string()]);
    }

    #[test]
    fn name_filter_rejects_titles_and_headers() {
        assert!(looks_like_name("Jane Smith"));
        assert!(looks_like_name("Jean-Luc O'Malley"));
        assert!(!looks_like_name("Senior Marketing Manager"));
        assert!(!looks_like_name("Meet The Team"));
        assert!(!looks_like_name("New York"));
        assert!(!looks_like_name("Jane"));
        assert!(!looks_like_name("jane smith"));
        assert!(!looks_like_name("Jane Smith 2024"));
    }

    #[test]
    fn role_cleaner_strips_structured_noise() {
        assert_eq!(
            clean_role_text("Based InBay AreaFocusInvestor Relations").as_deref(),
            Some("Investor Relations")
        );
        assert_eq!(clean_role_text(""), None);
        assert_eq!(clean_role_text("VP"), None);
        assert_eq!(clean_role_text("General Partner").as_deref(), Some("General Partner"));
    }
}
