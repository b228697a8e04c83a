//! CSV export: deduplicated master snapshot, timestamped history, and
//! incremental deltas against the prior master.

use crate::core::error::Result;
use crate::core::models::Lead;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The stable column set consumed by the external control-plane.
pub const FIELDNAMES: &[&str] = &[
    "Name", "Email", "Email Status", "Role", "Fund", "Focus Areas", "Stage",
    "Check Size", "Location", "LinkedIn", "Website", "Lead Score", "Tier",
    "Source", "Scraped At",
];

const MASTER_FILENAME: &str = "investor_leads_master.csv";

/// Exports leads with dedup, delta detection, and score-ordered output.
pub struct CsvExporter {
    output_dir: PathBuf,
    enriched_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        let enriched_dir = output_dir.join("enriched");
        std::fs::create_dir_all(&enriched_dir)?;
        Ok(CsvExporter {
            output_dir,
            enriched_dir,
        })
    }

    pub fn master_path(&self) -> PathBuf {
        self.enriched_dir.join(MASTER_FILENAME)
    }

    fn write(&self, leads: &[Lead], path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(FIELDNAMES)?;
        for lead in leads {
            let focus_areas = if lead.focus_areas.is_empty() {
                "N/A".to_string()
            } else {
                lead.focus_areas.join(", ")
            };
            let row: Vec<String> = vec![
                lead.name.clone(),
                lead.email.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.email_status.to_string(),
                lead.role.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.fund.clone(),
                focus_areas,
                lead.stage.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.check_size.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.location.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.linkedin.clone().unwrap_or_else(|| "N/A".to_string()),
                lead.website.clone(),
                lead.lead_score.to_string(),
                lead.tier.clone(),
                lead.source.clone(),
                lead.scraped_at.clone(),
            ];
            writer.write_record(&row)?;
        }
        writer.flush()?;
        tracing::info!(target: "output", "Saved {} leads -> {}", leads.len(), path.display());
        Ok(())
    }

    /// Leads not present in the current master, by (name, fund) key.
    /// Must run *before* `write_master` overwrites the comparison base.
    pub fn detect_deltas(&self, leads: &[Lead]) -> Result<Vec<Lead>> {
        let master = self.master_path();
        let mut existing: HashSet<(String, String)> = HashSet::new();

        if master.exists() {
            let mut reader = csv::Reader::from_path(&master)?;
            let headers = reader.headers()?.clone();
            let name_idx = headers.iter().position(|h| h == "Name");
            let fund_idx = headers.iter().position(|h| h == "Fund");
            if let (Some(name_idx), Some(fund_idx)) = (name_idx, fund_idx) {
                for record in reader.records() {
                    let record = record?;
                    existing.insert((
                        record.get(name_idx).unwrap_or("").trim().to_lowercase(),
                        record.get(fund_idx).unwrap_or("").trim().to_lowercase(),
                    ));
                }
            }
        }

        let deltas: Vec<Lead> = leads
            .iter()
            .filter(|lead| !existing.contains(&lead.dedup_key()))
            .cloned()
            .collect();

        if deltas.is_empty() {
            tracing::info!(target: "output",
                "No new leads - all {} already in master", leads.len());
        } else {
            tracing::info!(target: "output",
                "{} new leads detected (delta from master)", deltas.len());
        }
        Ok(deltas)
    }

    /// Write the deduplicated master snapshot, a timestamped history
    /// copy, and the delta file. Returns the master path.
    pub fn write_master(&self, leads: &[Lead]) -> Result<PathBuf> {
        let deltas = self.detect_deltas(leads)?;

        // Dedup by (name, fund); persisted leads always carry a name.
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut deduped: Vec<Lead> = leads
            .iter()
            .filter(|lead| !lead.name.trim().is_empty())
            .filter(|lead| seen.insert(lead.dedup_key()))
            .cloned()
            .collect();

        // Highest score first; ties resolve by name then fund so the
        // export is byte-stable across runs.
        deduped.sort_by(|a, b| {
            b.lead_score
                .cmp(&a.lead_score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.fund.cmp(&b.fund))
        });

        let master = self.master_path();
        self.write(&deduped, &master)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let snapshot = self.enriched_dir.join(format!("leads_{}.csv", timestamp));
        self.write(&deduped, &snapshot)?;

        if !deltas.is_empty() {
            let delta_path = self.enriched_dir.join(format!("leads_{}_delta.csv", timestamp));
            self.write(&deltas, &delta_path)?;
        }

        Ok(master)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::EmailStatus;
    use tempfile::tempdir;

    fn lead(name: &str, fund: &str, score: u8) -> Lead {
        let mut lead = Lead::new(name, fund, "https://acme.vc");
        lead.lead_score = score;
        lead.tier = "WARM".to_string();
        lead
    }

    #[test]
    fn master_dedups_and_sorts_by_score() {
        let dir = tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();

        let leads = vec![
            lead("Jane Smith", "Acme", 60),
            lead("JANE SMITH", "acme", 90), // duplicate key, first one wins
            lead("Bob Jones", "Acme", 85),
        ];
        exporter.write_master(&leads).unwrap();

        let mut reader = csv::Reader::from_path(exporter.master_path()).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0).unwrap(), "Bob Jones");
        assert_eq!(rows[1].get(0).unwrap(), "Jane Smith");
    }

    #[test]
    fn empty_names_never_persist() {
        let dir = tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();
        let mut nameless = lead("", "Acme", 50);
        nameless.assign_email("x@acme.vc", EmailStatus::ScrapedFromPage);
        exporter
            .write_master(&[nameless, lead("Jane Smith", "Acme", 40)])
            .unwrap();

        let mut reader = csv::Reader::from_path(exporter.master_path()).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(0).unwrap(), "Jane Smith");
    }

    #[test]
    fn sentinel_email_exports_as_na_with_unverified_status() {
        let dir = tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();
        exporter.write_master(&[lead("Jane Smith", "Acme", 40)]).unwrap();

        let mut reader = csv::Reader::from_path(exporter.master_path()).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.get(1).unwrap(), "N/A");
        assert_eq!(row.get(2).unwrap(), "unverified");
    }

    #[test]
    fn deltas_are_relative_to_prior_master() {
        let dir = tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();

        exporter.write_master(&[lead("Jane Smith", "Acme", 50)]).unwrap();

        let second_run = vec![lead("Jane Smith", "Acme", 55), lead("Bob Jones", "Acme", 70)];
        let deltas = exporter.detect_deltas(&second_run).unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].name, "Bob Jones");
    }

    #[test]
    fn header_matches_stable_column_set() {
        let dir = tempdir().unwrap();
        let exporter = CsvExporter::new(dir.path()).unwrap();
        exporter.write_master(&[lead("Jane Smith", "Acme", 50)]).unwrap();

        let mut reader = csv::Reader::from_path(exporter.master_path()).unwrap();
        let headers: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(headers, FIELDNAMES);
    }
}
