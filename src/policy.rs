//! Decision Policy
//!
//! One threshold, one rule, applied identically at every entry point that
//! runs the pipeline.

use serde::Serialize;

/// Pipeline outcome for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Blocked,
    Forwarded,
}

/// Blocked iff `probability >= threshold` (closed on the upper side).
pub fn decide(probability: f64, threshold: f64) -> Decision {
    if probability >= threshold {
        Decision::Blocked
    } else {
        Decision::Forwarded
    }
}
