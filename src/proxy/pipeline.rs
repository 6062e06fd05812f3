//! Pipeline execution
//!
//! One run per intercepted request: extract -> score -> decide, then the
//! audit write and live broadcast fire as side effects while the relay
//! (or the synthesized rejection) produces the caller's response.
//!
//! The feature vector is extracted exactly once; the same vector feeds
//! the decision and the persisted record.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::features;
use crate::models::RequestRecord;
use crate::oracle::{guarded_score, Oracle};
use crate::policy::{decide, Decision};
use crate::relay::{ForwardRequest, Relay, RelayError, RelayResponse};
use crate::stats::ProxyStats;
use crate::store::AuditStore;

/// Upper bound on one audit write; a write past this is abandoned and
/// reported, never blocks the response.
const AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a pipeline run needs. Shared across connection workers;
/// the store and broadcaster synchronize internally, the oracle is
/// stateless per call.
pub struct PipelineContext {
    pub config: Config,
    pub oracle: Arc<dyn Oracle>,
    pub relay: Arc<dyn Relay>,
    pub store: Arc<AuditStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub stats: Arc<ProxyStats>,
}

/// What the caller gets back.
#[derive(Debug)]
pub enum PipelineResponse {
    /// Decision was Blocked: fixed rejection, origin never contacted.
    Rejected { probability: f64 },
    /// Origin answered; relay its response verbatim.
    Relayed(RelayResponse),
    /// Transport-level relay failure, surfaced as a 5xx.
    RelayFailed(RelayError),
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub record: RequestRecord,
    pub response: PipelineResponse,
}

/// Run the full pipeline for one intercepted request.
pub async fn run(
    ctx: &PipelineContext,
    method: String,
    target: String,
    headers: BTreeMap<String, String>,
    body: String,
) -> PipelineOutcome {
    let vector_headers = ctx.config.include_headers.then_some(&headers);
    let vector = features::extract(&target, &body, vector_headers);
    let probability = guarded_score(ctx.oracle.as_ref(), &vector, &ctx.stats);
    let decision = decide(probability, ctx.config.threshold);

    let record = RequestRecord::completed(
        method.clone(),
        target.clone(),
        body.clone(),
        headers.clone(),
        probability,
        decision,
    );

    ctx.stats.requests_total.fetch_add(1, Ordering::Relaxed);
    match decision {
        Decision::Blocked => ctx.stats.blocked.fetch_add(1, Ordering::Relaxed),
        Decision::Forwarded => ctx.stats.forwarded.fetch_add(1, Ordering::Relaxed),
    };

    tracing::info!(
        id = %record.id,
        method = %method,
        target = %target,
        probability,
        decision = ?decision,
        "decision made"
    );

    ctx.broadcaster.publish(&record);

    let response = match decision {
        Decision::Blocked => {
            // Audit write still happens; the origin is never contacted.
            persist(ctx, &record).await;
            PipelineResponse::Rejected { probability }
        }
        Decision::Forwarded => {
            let forward = ForwardRequest {
                method,
                url: target,
                headers,
                body,
            };
            let (_, relayed) = tokio::join!(persist(ctx, &record), ctx.relay.forward(forward));
            match relayed {
                Ok(response) => PipelineResponse::Relayed(response),
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "relay failed");
                    PipelineResponse::RelayFailed(e)
                }
            }
        }
    };

    PipelineOutcome { record, response }
}

/// Append the record off the async runtime, bounded by [`AUDIT_TIMEOUT`].
/// Failures are counted and logged; the already-computed response is
/// never suppressed.
async fn persist(ctx: &PipelineContext, record: &RequestRecord) {
    let store = Arc::clone(&ctx.store);
    let to_write = record.clone();
    let write = tokio::task::spawn_blocking(move || store.append(&to_write));

    let failure = match tokio::time::timeout(AUDIT_TIMEOUT, write).await {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(e))) => Some(e.to_string()),
        Ok(Err(join_err)) => Some(format!("audit task panicked: {}", join_err)),
        Err(_) => Some("audit write timed out".to_string()),
    };

    if let Some(reason) = failure {
        ctx.stats.audit_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(id = %record.id, reason, "audit write failed, trail has a gap");
    }
}
