//! On-demand analysis and replay
//!
//! Both endpoints run outside the inline proxy path: `analyze` scores a
//! request specification without contacting anything, `replay` sends one
//! through the relay without touching the audit log.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::features::{self, FeatureVector};
use crate::models::Verdict;
use crate::oracle::guarded_score;
use crate::policy::decide;
use crate::relay::ForwardRequest;
use crate::{AppError, AppResult, AppState};

const REPLAYABLE_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Deserialize)]
pub struct AnalyzePayload {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub prediction: &'static str,
    pub confidence: f64,
    pub verdict: Verdict,
    pub features: FeatureVector,
    pub malicious_patterns: Vec<&'static str>,
    pub explanation: String,
    pub request_details: RequestDetails,
}

#[derive(Debug, Serialize)]
pub struct RequestDetails {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Score a request without proxying it. Uses the same oracle, the same
/// threshold, and the same header-inclusion setting as the pipeline.
pub async fn analyze_request(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzePayload>,
) -> Json<AnalysisReport> {
    let vector_headers = state.config.include_headers.then_some(&payload.headers);
    let vector = features::extract(&payload.url, &payload.body, vector_headers);
    let probability = guarded_score(state.oracle.as_ref(), &vector, &state.stats);
    let decision = decide(probability, state.config.threshold);

    let blocked = decision == crate::policy::Decision::Blocked;
    let confidence = if blocked { probability } else { 1.0 - probability };
    let patterns = features::matched_tokens(&payload.url, &payload.body, vector_headers);

    let explanation = format!(
        "Detected {} suspicious token(s). Single quotes: {}, double quotes: {}, dashes: {}.",
        vector.suspicious, vector.single_q, vector.double_q, vector.dashes
    );

    Json(AnalysisReport {
        prediction: if blocked { "Malicious" } else { "Normal" },
        confidence,
        verdict: Verdict {
            probability,
            decision,
        },
        features: vector,
        malicious_patterns: patterns,
        explanation,
        request_details: RequestDetails {
            method: payload.method.to_uppercase(),
            url: payload.url,
            headers: payload.headers,
            body: payload.body,
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct ReplayPayload {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Origin answer as JSON. The body is a lossy text preview; the raw
/// bytes only matter on the inline proxy path, not in an investigation
/// response.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Send a described request through the relay and return the origin's
/// answer. The audit log is untouched; replays are investigations, not
/// decisions.
pub async fn replay_request(
    State(state): State<AppState>,
    Json(payload): Json<ReplayPayload>,
) -> AppResult<Json<ReplayReport>> {
    let method = payload.method.to_uppercase();
    if !REPLAYABLE_METHODS.contains(&method.as_str()) {
        return Err(AppError::ValidationError(format!(
            "unsupported HTTP method: {}",
            payload.method
        )));
    }
    if payload.url.is_empty() {
        return Err(AppError::ValidationError("url is required".to_string()));
    }

    let response = state
        .relay
        .forward(ForwardRequest {
            method,
            url: payload.url,
            headers: payload.headers,
            body: payload.body,
        })
        .await?;

    Ok(Json(ReplayReport {
        body: response.body_text(),
        status: response.status,
        headers: response.headers,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::Config;
    use crate::models::RecordStatus;
    use crate::oracle::{Oracle, OracleError};
    use crate::policy::Decision;
    use crate::proxy::pipeline::{self, PipelineContext};
    use crate::proxy::ProxyListener;
    use crate::relay::{Relay, RelayError, RelayResponse};
    use crate::stats::ProxyStats;
    use crate::store::AuditStore;

    struct FixedOracle {
        probability: f64,
        last_vector: Mutex<Option<FeatureVector>>,
    }

    impl FixedOracle {
        fn new(probability: f64) -> Self {
            Self {
                probability,
                last_vector: Mutex::new(None),
            }
        }
    }

    impl Oracle for FixedOracle {
        fn score(&self, features: &FeatureVector) -> Result<f64, OracleError> {
            *self.last_vector.lock() = Some(*features);
            Ok(self.probability)
        }
    }

    struct NoopRelay;

    #[async_trait]
    impl Relay for NoopRelay {
        async fn forward(&self, _: ForwardRequest) -> Result<RelayResponse, RelayError> {
            Ok(RelayResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: bytes::Bytes::new(),
            })
        }
    }

    /// Full AppState plus the pipeline context it shares, both wired to
    /// the same oracle double and in-memory store.
    fn state_with(oracle: Arc<FixedOracle>) -> (AppState, Arc<PipelineContext>) {
        let config = Config::default();
        let stats = Arc::new(ProxyStats::new());
        let store = Arc::new(AuditStore::open_in_memory().unwrap());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&stats)));
        let oracle: Arc<dyn Oracle> = oracle;
        let relay: Arc<dyn Relay> = Arc::new(NoopRelay);

        let ctx = Arc::new(PipelineContext {
            config: config.clone(),
            oracle: Arc::clone(&oracle),
            relay: Arc::clone(&relay),
            store: Arc::clone(&store),
            broadcaster: Arc::clone(&broadcaster),
            stats: Arc::clone(&stats),
        });
        let listener = Arc::new(ProxyListener::new(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&ctx),
        ));

        let state = AppState {
            config,
            listener,
            store,
            broadcaster,
            oracle,
            relay,
            stats,
        };
        (state, ctx)
    }

    fn payload() -> AnalyzePayload {
        AnalyzePayload {
            method: "GET".to_string(),
            url: "/login?user=admin' OR '1'='1".to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn analyze_verdict_matches_the_pipeline_decision() {
        // Either side of the configured cutoff, boundary included.
        let cases = [
            (0.34, Decision::Forwarded),
            (0.35, Decision::Blocked),
            (0.36, Decision::Blocked),
        ];

        for (probability, expected) in cases {
            let oracle = Arc::new(FixedOracle::new(probability));
            let (state, ctx) = state_with(Arc::clone(&oracle));
            assert_eq!(state.config.threshold, ctx.config.threshold);

            let Json(report) = analyze_request(State(state), Json(payload())).await;
            assert_eq!(report.verdict.decision, expected);
            assert_eq!(report.verdict.probability, probability);

            let outcome = pipeline::run(
                &ctx,
                "GET".to_string(),
                "/login?user=admin' OR '1'='1".to_string(),
                BTreeMap::new(),
                String::new(),
            )
            .await;
            assert_eq!(outcome.record.status, RecordStatus::from(expected));
        }
    }

    #[tokio::test]
    async fn analyze_feeds_the_oracle_the_same_vector_as_the_pipeline() {
        let oracle = Arc::new(FixedOracle::new(0.0));
        let (state, ctx) = state_with(Arc::clone(&oracle));

        let mut headers = BTreeMap::new();
        headers.insert("x-extra".to_string(), "' union select --".to_string());

        let mut request = payload();
        request.headers = headers.clone();
        let _ = analyze_request(State(state), Json(request)).await;
        let analyzed = oracle.last_vector.lock().unwrap();

        pipeline::run(
            &ctx,
            "GET".to_string(),
            "/login?user=admin' OR '1'='1".to_string(),
            headers,
            String::new(),
        )
        .await;
        let piped = oracle.last_vector.lock().unwrap();

        // Same input, same extraction settings: headers stay excluded on
        // both paths unless configured in.
        assert_eq!(analyzed, piped);
        assert_eq!(analyzed.suspicious, 0);
    }
}
