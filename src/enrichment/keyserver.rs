//! Stage 5: public key-server search.
//!
//! HKP keyservers are federated, intentionally-public directories; key
//! UIDs almost always embed the owner's real address. Unlike the
//! avatar oracle (which confirms a guess) this can surface addresses
//! no pattern would ever generate.

use super::{group_by_domain, EnrichmentStage, StageContext, StageReport};
use crate::core::config::Config;
use crate::core::models::{EmailStatus, Lead};

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::Semaphore;

/// HKP machine-readable index endpoints.
const KEYSERVERS: &[&str] = &[
    "https://keyserver.ubuntu.com/pks/lookup?op=vindex&search={query}&options=mr",
    "https://keys.mailvelope.com/pks/lookup?op=vindex&search={query}&options=mr",
];

const IGNORE_MARKERS: &[&str] = &[
    "noreply", "no-reply", "example.com", "test@", "root@",
    "admin@", "support@", "info@", "security@",
];

pub struct KeyserverSearch {
    semaphore: Semaphore,
    email_re: Regex,
    search_pause: Duration,
}

impl KeyserverSearch {
    pub fn new(_config: &Config) -> Self {
        KeyserverSearch {
            semaphore: Semaphore::new(10),
            email_re: Regex::new(r"[a-zA-Z0-9._%+\-']+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,15}")
                .expect("static email regex"),
            search_pause: Duration::from_millis(300),
        }
    }

    fn useful(&self, email: &str, target_domain: &str) -> bool {
        let email = email.to_lowercase();
        if email.len() > 60 || email.len() < 5 {
            return false;
        }
        if IGNORE_MARKERS.iter().any(|m| email.contains(m)) {
            return false;
        }
        email.ends_with(&format!("@{}", target_domain))
    }

    /// Query one keyserver's vindex and pull addresses out of uid lines.
    /// Format: `uid:<url-encoded name <email>>:<created>:<expires>:<flags>`
    async fn search_keyserver(&self, url: &str, ctx: &StageContext) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        let response = match ctx
            .http
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::trace!(target: "keyserver", "Keyserver returned {}", resp.status());
                return found;
            }
            Err(e) => {
                tracing::debug!(target: "keyserver", "Keyserver query failed: {}", e);
                return found;
            }
        };

        let Ok(text) = response.text().await else {
            return found;
        };

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("uid:") {
                let uid_field = rest.split(':').next().unwrap_or("");
                let decoded = percent_decode_str(uid_field)
                    .decode_utf8()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| uid_field.to_string());
                for m in self.email_re.find_iter(&decoded) {
                    found.insert(m.as_str().trim_end_matches('.').to_lowercase());
                }
            }
        }
        found
    }

    /// Search every keyserver for a person's name.
    async fn search_by_name(&self, name: &str, ctx: &StageContext) -> BTreeSet<String> {
        let query = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();
        let mut all = BTreeSet::new();
        for server in KEYSERVERS {
            let url = server.replace("{query}", &query);
            all.extend(self.search_keyserver(&url, ctx).await);
        }
        all
    }
}

#[async_trait]
impl EnrichmentStage for KeyserverSearch {
    fn name(&self) -> &'static str {
        "pgp_keyserver"
    }

    async fn enrich(&self, leads: &mut [Lead], ctx: &StageContext) -> StageReport {
        let mut report = StageReport::new(self.name());
        let groups = group_by_domain(leads, true);
        report.domains_touched = groups.len();

        for (domain, indices) in groups {
            for idx in indices {
                if !leads[idx].needs_email() {
                    continue;
                }
                let name = leads[idx].name.clone();
                let emails = self.search_by_name(&name, ctx).await;

                // Prefer a domain-matching address; anything else is
                // likely a different person with the same name.
                if let Some(best) = emails.iter().find(|e| self.useful(e, &domain)) {
                    tracing::info!(target: "keyserver", "Key UID email: {} -> {}", name, best);
                    leads[idx].assign_email(best.clone(), EmailStatus::ScrapedFromPage);
                    report.leads_enriched += 1;
                }

                tokio::time::sleep(self.search_pause).await;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_target_domain() {
        let search = KeyserverSearch::new(&Config::default());
        assert!(search.useful("jane.smith@acme.vc", "acme.vc"));
        assert!(!search.useful("jane.smith@gmail.com", "acme.vc"));
        assert!(!search.useful("info@acme.vc", "acme.vc"));
        assert!(!search.useful("noreply@acme.vc", "acme.vc"));
    }

    #[test]
    fn uid_lines_parse_out_of_vindex_payload() {
        let search = KeyserverSearch::new(&Config::default());
        let payload = "info:1:2\npub:ABCD1234:1:2048:1500000000::\nuid:Jane%20Smith%20%3Cjane.smith%40acme.vc%3E:1500000000::\n";
        let mut found = BTreeSet::new();
        for line in payload.lines() {
            if let Some(rest) = line.strip_prefix("uid:") {
                let uid_field = rest.split(':').next().unwrap_or("");
                let decoded = percent_decode_str(uid_field).decode_utf8().unwrap();
                for m in search.email_re.find_iter(&decoded) {
                    found.insert(m.as_str().to_lowercase());
                }
            }
        }
        assert!(found.contains("jane.smith@acme.vc"));
    }
}
