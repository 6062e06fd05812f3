//! Classifier Oracle
//!
//! The core treats the scoring model as an opaque collaborator: a function
//! from feature vector to malicious probability in [0,1]. Any backend that
//! satisfies [`Oracle`] plugs in - the shipped coefficient table, a remote
//! scoring service, or a rule engine.
//!
//! Oracle faults are caught at the call boundary ([`guarded_score`]) and
//! mapped to probability 0.0: a broken model must never silently block
//! legitimate traffic.

use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::stats::ProxyStats;

/// Probability reported for a predicted-malicious verdict from a
/// binary-only backend. Policy constant, not derived.
pub const BINARY_MALICIOUS_PROB: f64 = 0.7;

/// Probability reported for a predicted-benign verdict from a
/// binary-only backend. Policy constant, not derived.
pub const BINARY_BENIGN_PROB: f64 = 0.1;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("scoring backend failure: {0}")]
    Backend(String),

    #[error("scoring backend returned a non-finite probability")]
    NonFinite,
}

/// External scoring function: feature vector -> malicious probability.
///
/// Implementations must be deterministic for a fixed vector and model
/// state, bounded in [0,1], and safe to share across workers without
/// locking.
pub trait Oracle: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<f64, OracleError>;
}

/// Backend exposing only a yes/no prediction.
pub trait BinaryClassifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<bool, OracleError>;
}

// ============================================================================
// SHIPPED BACKENDS
// ============================================================================

/// Coefficient-table logistic model.
///
/// The default scoring backend: a weight per feature plus a bias, squashed
/// through a sigmoid. Output is always finite and inside [0,1].
#[derive(Debug, Clone)]
pub struct LogisticOracle {
    weights: [f64; FEATURE_COUNT],
    bias: f64,
}

impl Default for LogisticOracle {
    fn default() -> Self {
        // Shipped coefficients, layout order:
        // single_q, double_q, dashes, braces, spaces, suspicious
        Self {
            weights: [0.80, 0.40, 0.90, 0.20, 0.05, 0.60],
            bias: -3.0,
        }
    }
}

impl Oracle for LogisticOracle {
    fn score(&self, features: &FeatureVector) -> Result<f64, OracleError> {
        let z = features
            .as_array()
            .iter()
            .zip(self.weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.bias;

        let p = 1.0 / (1.0 + (-z).exp());
        if !p.is_finite() {
            return Err(OracleError::NonFinite);
        }
        Ok(p.clamp(0.0, 1.0))
    }
}

/// Adapter for binary-only backends: maps the verdict to a fixed
/// confidence ([`BINARY_MALICIOUS_PROB`] / [`BINARY_BENIGN_PROB`]).
pub struct BinaryOracle<C> {
    inner: C,
}

impl<C: BinaryClassifier> BinaryOracle<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: BinaryClassifier> Oracle for BinaryOracle<C> {
    fn score(&self, features: &FeatureVector) -> Result<f64, OracleError> {
        Ok(if self.inner.predict(features)? {
            BINARY_MALICIOUS_PROB
        } else {
            BINARY_BENIGN_PROB
        })
    }
}

// ============================================================================
// FAULT GUARD
// ============================================================================

/// Score with the conservative fault policy applied.
///
/// An oracle error, or a score outside [0,1], is logged, counted as a
/// fault, and replaced: errors become 0.0 (treat as benign), out-of-range
/// scores are clamped. Never propagates a request-fatal error.
pub fn guarded_score(oracle: &dyn Oracle, features: &FeatureVector, stats: &ProxyStats) -> f64 {
    match oracle.score(features) {
        Ok(p) if (0.0..=1.0).contains(&p) => p,
        Ok(p) => {
            stats.oracle_faults.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(probability = p, "oracle returned out-of-range probability, clamping");
            p.clamp(0.0, 1.0)
        }
        Err(e) => {
            stats.oracle_faults.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "oracle fault, defaulting to benign probability 0.0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::extract;

    struct FailingOracle;

    impl Oracle for FailingOracle {
        fn score(&self, _: &FeatureVector) -> Result<f64, OracleError> {
            Err(OracleError::Backend("model file corrupted".into()))
        }
    }

    struct OutOfRangeOracle;

    impl Oracle for OutOfRangeOracle {
        fn score(&self, _: &FeatureVector) -> Result<f64, OracleError> {
            Ok(1.7)
        }
    }

    struct AlwaysMalicious;

    impl BinaryClassifier for AlwaysMalicious {
        fn predict(&self, _: &FeatureVector) -> Result<bool, OracleError> {
            Ok(true)
        }
    }

    struct AlwaysBenign;

    impl BinaryClassifier for AlwaysBenign {
        fn predict(&self, _: &FeatureVector) -> Result<bool, OracleError> {
            Ok(false)
        }
    }

    #[test]
    fn logistic_is_bounded_and_deterministic() {
        let oracle = LogisticOracle::default();
        let hot = extract("/login?user=admin' OR '1'='1", "", None);
        let cold = extract("/search?q=hello", "", None);

        let p_hot = oracle.score(&hot).unwrap();
        let p_cold = oracle.score(&cold).unwrap();

        assert!((0.0..=1.0).contains(&p_hot));
        assert!((0.0..=1.0).contains(&p_cold));
        assert!(p_hot > p_cold);
        assert_eq!(oracle.score(&hot).unwrap(), p_hot);
    }

    #[test]
    fn logistic_separates_injection_from_benign_at_default_threshold() {
        let oracle = LogisticOracle::default();
        let hot = extract("/login?user=admin' OR '1'='1", "", None);
        let cold = extract("/search?q=hello", "", None);

        assert!(oracle.score(&hot).unwrap() >= 0.35);
        assert!(oracle.score(&cold).unwrap() < 0.35);
    }

    #[test]
    fn binary_adapter_uses_documented_constants() {
        let v = FeatureVector::default();
        assert_eq!(
            BinaryOracle::new(AlwaysMalicious).score(&v).unwrap(),
            BINARY_MALICIOUS_PROB
        );
        assert_eq!(
            BinaryOracle::new(AlwaysBenign).score(&v).unwrap(),
            BINARY_BENIGN_PROB
        );
    }

    #[test]
    fn guard_maps_faults_to_benign_and_counts_them() {
        let stats = ProxyStats::new();
        let p = guarded_score(&FailingOracle, &FeatureVector::default(), &stats);
        assert_eq!(p, 0.0);
        assert_eq!(stats.snapshot().oracle_faults, 1);
    }

    #[test]
    fn guard_clamps_out_of_range_scores() {
        let stats = ProxyStats::new();
        let p = guarded_score(&OutOfRangeOracle, &FeatureVector::default(), &stats);
        assert_eq!(p, 1.0);
        assert_eq!(stats.snapshot().oracle_faults, 1);
    }
}
