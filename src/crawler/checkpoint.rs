//! Crawl progress checkpointing.
//!
//! The deep crawler writes every accumulated lead to a checkpoint CSV
//! after each batch of domains, so a crash loses at most one batch.
//! Recovery reads the same file back on the next run.

use crate::core::error::Result;
use crate::core::models::{EmailStatus, Lead};
use std::path::Path;

/// Write all leads to the checkpoint file, replacing any previous one.
pub fn save_checkpoint(path: &Path, leads: &[Lead]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "name",
        "role",
        "email",
        "email_status",
        "linkedin",
        "fund_name",
        "fund_url",
        "source_page",
        "scraped_at",
    ])?;
    for lead in leads {
        let row: Vec<String> = vec![
            lead.name.clone(),
            lead.role.clone().unwrap_or_default(),
            lead.email.clone().unwrap_or_default(),
            lead.email_status.to_string(),
            lead.linkedin.clone().unwrap_or_default(),
            lead.fund.clone(),
            lead.website.clone(),
            lead.source.clone(),
            lead.scraped_at.clone(),
        ];
        writer.write_record(&row)?;
    }
    writer.flush()?;
    tracing::info!(target: "checkpoint", "Checkpoint: {} leads -> {}", leads.len(), path.display());
    Ok(())
}

/// Load leads from a checkpoint CSV. A missing file yields an empty set.
pub fn load_checkpoint(path: &Path) -> Result<Vec<Lead>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let field = |record: &csv::StringRecord, name: &str| -> Option<String> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| record.get(i))
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
    };

    let mut leads = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(name) = field(&record, "name") else {
            continue;
        };
        let mut lead = Lead::new(
            name,
            field(&record, "fund_name").unwrap_or_default(),
            field(&record, "fund_url").unwrap_or_default(),
        );
        lead.role = field(&record, "role");
        lead.linkedin = field(&record, "linkedin");
        lead.source = field(&record, "source_page").unwrap_or_default();
        lead.scraped_at = field(&record, "scraped_at").unwrap_or_default();
        if let Some(email) = field(&record, "email") {
            let status = field(&record, "email_status")
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok())
                .unwrap_or(EmailStatus::ScrapedFromPage);
            lead.assign_email(email, status);
        }
        leads.push(lead);
    }

    tracing::info!(target: "checkpoint",
        "Recovered {} leads from checkpoint {}", leads.len(), path.display());
    Ok(leads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn checkpoint_round_trips_leads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.csv");

        let mut jane = Lead::new("Jane Smith", "Acme Ventures", "https://acme.vc");
        jane.role = Some("Partner".to_string());
        jane.assign_email("jane@acme.vc", EmailStatus::PatternGuessed);
        jane.source = "https://acme.vc/team".to_string();
        let bob = Lead::new("Bob Jones", "Acme Ventures", "https://acme.vc");

        save_checkpoint(&path, &[jane.clone(), bob.clone()]).unwrap();
        let recovered = load_checkpoint(&path).unwrap();

        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].name, "Jane Smith");
        assert_eq!(recovered[0].email.as_deref(), Some("jane@acme.vc"));
        assert_eq!(recovered[0].email_status, EmailStatus::PatternGuessed);
        assert_eq!(recovered[0].role.as_deref(), Some("Partner"));
        assert_eq!(recovered[1].name, "Bob Jones");
        assert!(recovered[1].email.is_none());
        assert_eq!(recovered[1].email_status, EmailStatus::Unverified);
    }

    #[test]
    fn missing_checkpoint_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let leads = load_checkpoint(&dir.path().join("nope.csv")).unwrap();
        assert!(leads.is_empty());
    }

    #[test]
    fn rows_without_names_are_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.csv");
        std::fs::write(
            &path,
            "name,role,email,email_status,linkedin,fund_name,fund_url,source_page,scraped_at\n\
             ,Partner,x@acme.vc,scraped_from_page,,Acme,https://acme.vc,,\n\
             Jane Smith,Partner,,,,Acme,https://acme.vc,,\n",
        )
        .unwrap();
        let leads = load_checkpoint(&path).unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].name, "Jane Smith");
    }
}
