//! First-class politeness primitives: per-host interval gating and
//! run-scoped subsystem fuses.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum gap between consecutive requests to the same remote
/// host. Used for SMTP mail exchangers (greylisting defense) and for
/// fair-use HTTP endpoints (EDGAR, Wayback).
///
/// The gate is keyed, not global: probing `mx1.acme.vc` never delays a
/// concurrent probe of `mx.other.com`.
#[derive(Clone)]
pub struct HostGate {
    min_gap: Duration,
    slots: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HostGate {
    pub fn new(min_gap: Duration) -> Self {
        HostGate {
            min_gap,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Waits until the host's slot is free, then claims it.
    ///
    /// Claiming happens under the lock, so two tasks acquiring the same
    /// host serialize: the second sees the first's reservation and sleeps
    /// past it.
    pub async fn acquire(&self, host: &str) {
        let key = host.trim_end_matches('.').to_lowercase();
        loop {
            let wait = {
                let mut slots = self.slots.lock();
                let now = Instant::now();
                match slots.get(&key) {
                    Some(&next_free) if next_free > now => next_free - now,
                    _ => {
                        slots.insert(key.clone(), now + self.min_gap);
                        return;
                    }
                }
            };
            tracing::trace!(target: "rate_limit", "Gate busy for {}, waiting {:?}", key, wait);
            tokio::time::sleep(wait).await;
        }
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }
}

/// Run-scoped self-disable switch for a subsystem.
///
/// When a dependency signals a policy rejection (captcha wall, outbound
/// port 25 blocked, hard API ban) the owning subsystem trips its fuse and
/// every further call short-circuits to "indeterminate" instead of
/// hammering a service that already said no.
#[derive(Clone, Default)]
pub struct Fuse {
    tripped: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl Fuse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.tripped.swap(true, Ordering::SeqCst) {
            tracing::warn!(target: "rate_limit", "Subsystem self-disabled for this run: {}", reason);
            *self.reason.lock() = Some(reason);
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn gate_enforces_min_gap_per_host() {
        let gate = HostGate::new(Duration::from_secs(3));

        let start = Instant::now();
        gate.acquire("mx.acme.vc").await;
        assert!(start.elapsed() < Duration::from_millis(10));

        gate.acquire("mx.acme.vc").await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_does_not_couple_distinct_hosts() {
        let gate = HostGate::new(Duration::from_secs(5));

        let start = Instant::now();
        gate.acquire("mx.acme.vc").await;
        gate.acquire("aspmx.l.google.com").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_normalizes_trailing_dot_and_case() {
        let gate = HostGate::new(Duration::from_secs(2));

        let start = Instant::now();
        gate.acquire("MX.Acme.VC.").await;
        gate.acquire("mx.acme.vc").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn fuse_trips_once_and_keeps_first_reason() {
        let fuse = Fuse::new();
        assert!(!fuse.is_tripped());
        fuse.trip("captcha wall");
        fuse.trip("second reason ignored");
        assert!(fuse.is_tripped());
        assert_eq!(fuse.reason().as_deref(), Some("captcha wall"));
    }
}
