//! Incremental crawl freshness tracking.
//!
//! A per-domain table of {last crawled, leads found, status} gating
//! whether a domain is re-visited. The control-plane's storage owns the
//! durable table; this store only reads it (to decide staleness) and
//! appends to it (to record completed or skipped crawls), backed by a
//! JSON file at the configured path.

use crate::core::error::Result;
use crate::utils::domain::bare_domain;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Completion status of one domain crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Completed,
    /// Hard wall-clock budget exceeded; eligible again next run.
    SkippedTimeout,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStateRecord {
    pub domain: String,
    pub last_crawled_at: DateTime<Utc>,
    pub leads_found: usize,
    pub status: CrawlStatus,
    pub crawl_duration_s: f64,
}

/// File-backed crawl-state table.
pub struct CrawlStateStore {
    path: PathBuf,
    stale_days: u32,
    records: Mutex<HashMap<String, CrawlStateRecord>>,
}

impl CrawlStateStore {
    /// Load existing state; a missing file is an empty table.
    pub fn load(path: impl Into<PathBuf>, stale_days: u32) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let list: Vec<CrawlStateRecord> = serde_json::from_str(&content)?;
            list.into_iter().map(|r| (r.domain.clone(), r)).collect()
        } else {
            HashMap::new()
        };
        tracing::info!(target: "freshness",
            "Loaded {} domain crawl states from {}", records.len(), path.display());
        Ok(CrawlStateStore {
            path,
            stale_days,
            records: Mutex::new(records),
        })
    }

    fn normalize(url: &str) -> String {
        bare_domain(url).unwrap_or_else(|| url.trim().to_lowercase())
    }

    /// A domain is stale (crawl-eligible) when it was never crawled, was
    /// last crawled outside the freshness window, or its last attempt
    /// did not complete.
    pub fn is_stale(&self, url: &str) -> bool {
        let domain = Self::normalize(url);
        let records = self.records.lock();
        match records.get(&domain) {
            None => true,
            Some(record) if record.status != CrawlStatus::Completed => true,
            Some(record) => {
                let cutoff = Utc::now() - Duration::days(self.stale_days as i64);
                record.last_crawled_at < cutoff
            }
        }
    }

    /// Split URLs into (stale, fresh). Fresh domains are skipped this
    /// run and reported as such.
    pub fn filter_stale(&self, urls: &[String]) -> (Vec<String>, Vec<String>) {
        let mut stale = Vec::new();
        let mut fresh = Vec::new();
        for url in urls {
            if self.is_stale(url) {
                stale.push(url.clone());
            } else {
                fresh.push(url.clone());
            }
        }
        (stale, fresh)
    }

    /// Record a finished (or abandoned) crawl for a domain.
    pub fn mark_crawled(&self, url: &str, leads_found: usize, status: CrawlStatus, duration_s: f64) {
        let domain = Self::normalize(url);
        let record = CrawlStateRecord {
            domain: domain.clone(),
            last_crawled_at: Utc::now(),
            leads_found,
            status,
            crawl_duration_s: duration_s,
        };
        self.records.lock().insert(domain, record);
    }

    /// Append the in-memory table back to disk.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let records = self.records.lock();
        let mut list: Vec<&CrawlStateRecord> = records.values().collect();
        list.sort_by(|a, b| a.domain.cmp(&b.domain));
        let json = serde_json::to_string_pretty(&list)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(target: "freshness",
            "Persisted {} domain crawl states to {}", list.len(), self.path.display());
        Ok(())
    }

    pub fn summary(&self) -> FreshnessSummary {
        let records = self.records.lock();
        let cutoff = Utc::now() - Duration::days(self.stale_days as i64);
        let stale = records
            .values()
            .filter(|r| r.status != CrawlStatus::Completed || r.last_crawled_at < cutoff)
            .count();
        FreshnessSummary {
            total_domains: records.len(),
            stale_domains: stale,
            fresh_domains: records.len() - stale,
            stale_threshold_days: self.stale_days,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessSummary {
    pub total_domains: usize,
    pub stale_domains: usize,
    pub fresh_domains: usize,
    pub stale_threshold_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn unknown_domain_is_stale() {
        let dir = tempdir().unwrap();
        let store = CrawlStateStore::load(dir.path().join("state.json"), 7).unwrap();
        assert!(store.is_stale("https://acme.vc"));
    }

    #[test]
    fn just_crawled_domain_is_fresh_and_timeout_is_not() {
        let dir = tempdir().unwrap();
        let store = CrawlStateStore::load(dir.path().join("state.json"), 7).unwrap();

        store.mark_crawled("https://acme.vc", 12, CrawlStatus::Completed, 30.0);
        assert!(!store.is_stale("acme.vc"));

        // A timed-out crawl stays eligible for the next run.
        store.mark_crawled("https://slow.fund", 0, CrawlStatus::SkippedTimeout, 45.0);
        assert!(store.is_stale("slow.fund"));
    }

    #[test]
    fn filter_splits_by_freshness() {
        let dir = tempdir().unwrap();
        let store = CrawlStateStore::load(dir.path().join("state.json"), 7).unwrap();
        store.mark_crawled("https://fresh.vc", 5, CrawlStatus::Completed, 10.0);

        let urls = vec!["https://fresh.vc".to_string(), "https://new.fund".to_string()];
        let (stale, fresh) = store.filter_stale(&urls);
        assert_eq!(stale, vec!["https://new.fund".to_string()]);
        assert_eq!(fresh, vec!["https://fresh.vc".to_string()]);
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = CrawlStateStore::load(&path, 7).unwrap();
        store.mark_crawled("https://acme.vc", 12, CrawlStatus::Completed, 30.0);
        store.persist().unwrap();

        let reloaded = CrawlStateStore::load(&path, 7).unwrap();
        assert!(!reloaded.is_stale("acme.vc"));
        let summary = reloaded.summary();
        assert_eq!(summary.total_domains, 1);
        assert_eq!(summary.fresh_domains, 1);
    }

    #[test]
    fn www_prefix_and_scheme_do_not_split_domains() {
        let dir = tempdir().unwrap();
        let store = CrawlStateStore::load(dir.path().join("state.json"), 7).unwrap();
        store.mark_crawled("https://www.acme.vc/", 3, CrawlStatus::Completed, 5.0);
        assert!(!store.is_stale("acme.vc"));
        assert!(!store.is_stale("http://acme.vc"));
    }
}
