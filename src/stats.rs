//! Operator-facing counters
//!
//! Faults that must never become request-fatal (oracle errors, audit-store
//! failures, dropped broadcast deliveries) still have to be visible; they
//! signal gaps in the audit trail or the model serving path.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ProxyStats {
    pub requests_total: AtomicU64,
    pub blocked: AtomicU64,
    pub forwarded: AtomicU64,
    pub oracle_faults: AtomicU64,
    pub audit_failures: AtomicU64,
    pub broadcast_drops: AtomicU64,
}

/// Point-in-time snapshot for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub blocked: u64,
    pub forwarded: u64,
    pub oracle_faults: u64,
    pub audit_failures: u64,
    pub broadcast_drops: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            oracle_faults: self.oracle_faults.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            broadcast_drops: self.broadcast_drops.load(Ordering::Relaxed),
        }
    }
}
