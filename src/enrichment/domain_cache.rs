//! Process-wide per-domain memoization shared by every enrichment module.
//!
//! One logical owner populates each fact: the first worker that needs a
//! domain's MX/pattern/catch-all verdict takes the entry lock, probes,
//! and writes the result while everyone else waits on the same lock
//! (single-flight). Facts are monotonic for the run — a domain is
//! decided once classified and never invalidated mid-run.

use crate::enrichment::patterns::EmailPattern;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything the pipeline knows about one registrable domain.
#[derive(Debug, Default, Clone)]
pub struct DomainRecord {
    /// MX existence. `None` means not yet checked *or* the check timed
    /// out — a timeout is "unknown", never "absent".
    pub has_mx: Option<bool>,
    /// Preferred mail exchanger, when resolved.
    pub mail_server: Option<String>,
    /// Learned email-format pattern for this organization.
    pub pattern: Option<EmailPattern>,
    /// Catch-all verdict from RCPT probing.
    pub catch_all: Option<bool>,
    /// Raw candidate emails surfaced per OSINT module, keyed by module name.
    pub module_hits: HashMap<&'static str, BTreeSet<String>>,
}

/// Shared, concurrency-safe map of [`DomainRecord`]s.
#[derive(Default)]
pub struct DomainCache {
    entries: RwLock<HashMap<String, Arc<Mutex<DomainRecord>>>>,
}

impl DomainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create the entry for a domain. The returned handle is the
    /// per-key lock that makes expensive probes single-flight.
    pub fn entry(&self, domain: &str) -> Arc<Mutex<DomainRecord>> {
        let key = domain.trim().to_lowercase();
        if let Some(entry) = self.entries.read().get(&key) {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(key).or_default())
    }

    /// MX existence with single-flight probing. The probe runs at most
    /// once per domain per run; an indeterminate probe (`None`) leaves
    /// the slot open for a later, more expensive stage to try again.
    pub async fn mx_or_probe<F, Fut>(&self, domain: &str, probe: F) -> Option<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<(bool, Option<String>)>>,
    {
        let entry = self.entry(domain);
        let mut record = entry.lock().await;
        if let Some(known) = record.has_mx {
            return Some(known);
        }
        match probe().await {
            Some((has_mx, mail_server)) => {
                record.has_mx = Some(has_mx);
                if record.mail_server.is_none() {
                    record.mail_server = mail_server;
                }
                Some(has_mx)
            }
            None => None,
        }
    }

    /// Catch-all verdict with single-flight probing, same contract as
    /// [`Self::mx_or_probe`].
    pub async fn catch_all_or_probe<F, Fut>(&self, domain: &str, probe: F) -> Option<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<bool>>,
    {
        let entry = self.entry(domain);
        let mut record = entry.lock().await;
        if let Some(known) = record.catch_all {
            return Some(known);
        }
        match probe().await {
            Some(verdict) => {
                record.catch_all = Some(verdict);
                Some(verdict)
            }
            None => None,
        }
    }

    /// First learned pattern wins; later observations are ignored so all
    /// guesses for a domain stay mutually consistent.
    pub async fn learn_pattern(&self, domain: &str, pattern: EmailPattern) -> EmailPattern {
        let entry = self.entry(domain);
        let mut record = entry.lock().await;
        match record.pattern {
            Some(existing) => existing,
            None => {
                tracing::debug!(target: "domain_cache", "Learned pattern for {}: {}", domain, pattern);
                record.pattern = Some(pattern);
                pattern
            }
        }
    }

    pub async fn learned_pattern(&self, domain: &str) -> Option<EmailPattern> {
        let entry = self.entry(domain);
        let record = entry.lock().await;
        record.pattern
    }

    pub async fn mail_server(&self, domain: &str) -> Option<String> {
        let entry = self.entry(domain);
        let record = entry.lock().await;
        record.mail_server.clone()
    }

    pub async fn known_catch_all(&self, domain: &str) -> Option<bool> {
        let entry = self.entry(domain);
        let record = entry.lock().await;
        record.catch_all
    }

    /// Record raw candidate addresses surfaced by a module, returning the
    /// cached set if this module already ran for the domain.
    pub async fn module_hits_or_insert<F, Fut>(
        &self,
        domain: &str,
        module: &'static str,
        fetch: F,
    ) -> BTreeSet<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BTreeSet<String>>,
    {
        let entry = self.entry(domain);
        let mut record = entry.lock().await;
        if let Some(hits) = record.module_hits.get(module) {
            return hits.clone();
        }
        let hits = fetch().await;
        record.module_hits.insert(module, hits.clone());
        hits
    }

    /// Number of domains the cache currently tracks.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Count of domains with a learned pattern (for run summaries).
    pub fn patterns_learned(&self) -> usize {
        let entries = self.entries.read();
        entries
            .values()
            .filter(|e| e.try_lock().map(|r| r.pattern.is_some()).unwrap_or(false))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn mx_probe_runs_once_per_domain() {
        let cache = DomainCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = cache
                .mx_or_probe("acme.vc", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some((true, Some("mx.acme.vc".to_string())))
                })
                .await;
            assert_eq!(result, Some(true));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.mail_server("acme.vc").await.as_deref(), Some("mx.acme.vc"));
    }

    #[tokio::test]
    async fn indeterminate_probe_leaves_slot_open() {
        let cache = DomainCache::new();
        let result = cache.mx_or_probe("acme.vc", || async { None }).await;
        assert_eq!(result, None);

        // A later probe may still decide the domain.
        let result = cache
            .mx_or_probe("acme.vc", || async { Some((false, None)) })
            .await;
        assert_eq!(result, Some(false));
    }

    #[tokio::test]
    async fn first_learned_pattern_wins() {
        let cache = DomainCache::new();
        let first = cache
            .learn_pattern("acme.vc", EmailPattern::First)
            .await;
        assert_eq!(first, EmailPattern::First);
        let second = cache
            .learn_pattern("acme.vc", EmailPattern::FirstDotLast)
            .await;
        assert_eq!(second, EmailPattern::First);
        assert_eq!(cache.learned_pattern("acme.vc").await, Some(EmailPattern::First));
    }

    #[tokio::test]
    async fn module_hits_cached_per_module() {
        let cache = DomainCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let hits = cache
                .module_hits_or_insert("acme.vc", "dns_harvest", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    BTreeSet::from(["ops@acme.vc".to_string()])
                })
                .await;
            assert_eq!(hits.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_keys_are_case_insensitive() {
        let cache = DomainCache::new();
        cache.learn_pattern("Acme.VC", EmailPattern::First).await;
        assert_eq!(cache.learned_pattern("acme.vc").await, Some(EmailPattern::First));
        assert_eq!(cache.len(), 1);
    }
}
