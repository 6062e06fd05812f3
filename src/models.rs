//! Core data model - request records and classification verdicts

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::Decision;

/// Final state of an intercepted request.
///
/// `Pending` is a transient in-memory value only; the audit store refuses
/// to persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Blocked,
    Forwarded,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Blocked => "blocked",
            RecordStatus::Forwarded => "forwarded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecordStatus::Pending),
            "blocked" => Some(RecordStatus::Blocked),
            "forwarded" => Some(RecordStatus::Forwarded),
            _ => None,
        }
    }
}

impl From<Decision> for RecordStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Blocked => RecordStatus::Blocked,
            Decision::Forwarded => RecordStatus::Forwarded,
        }
    }
}

/// One durable audit entry per completed decision.
///
/// Created exactly once, with `status` already final; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
    pub malicious_prob: f64,
    pub malicious: bool,
    pub status: RecordStatus,
    pub created_at: String,
}

impl RequestRecord {
    /// Build a record for a completed decision. Enforces the
    /// `malicious == (status == blocked)` invariant by construction.
    pub fn completed(
        method: String,
        url: String,
        body: String,
        headers: BTreeMap<String, String>,
        malicious_prob: f64,
        decision: Decision,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url,
            body,
            headers,
            malicious_prob,
            malicious: decision == Decision::Blocked,
            status: decision.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Outcome of running the classifier over one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub probability: f64,
    pub decision: Decision,
}
