// crates/covenant-server/src/wire.rs
// ============================================================================
// Module: Ingress Wire Contract
// Description: Request decoding, status mapping, and progress streaming.
// Purpose: Bind HTTP routes onto the orchestrator decision flow.
// Dependencies: covenant-core, axum, tokio-stream, serde_json
// ============================================================================

//! ## Overview
//! Wire types mirror the external contract: a submission carries the
//! candidate kind, payload, principles, risk class, attributes, and the
//! submitter's constitutional identifier; responses surface the terminal
//! state, the decision verdict, and review references. Identity mismatches
//! map to 409 before any pipeline work runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::get;
use axum::routing::post;
use covenant_core::Candidate;
use covenant_core::CandidateId;
use covenant_core::CandidateKind;
use covenant_core::CandidatePayload;
use covenant_core::ConstitutionalTag;
use covenant_core::RiskClass;
use covenant_core::Timestamp;
use covenant_core::runtime::CandidateReport;
use covenant_core::runtime::CandidateState;
use covenant_core::runtime::GovernanceOrchestrator;
use covenant_core::runtime::OrchestratorError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll interval for progress streams.
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared state injected into every route.
///
/// # Invariants
/// - The orchestrator outlives the router.
#[derive(Clone)]
pub struct AppState {
    /// The governance orchestrator.
    pub orchestrator: Arc<GovernanceOrchestrator>,
}

/// Builds the ingress router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/candidates", post(submit_candidate))
        .route("/v1/decisions/{candidate_id}", get(query_decision))
        .route("/v1/candidates/{candidate_id}/progress", get(subscribe_progress))
        .with_state(state)
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Candidate submission request.
///
/// # Invariants
/// - `constitutional_identifier` must equal the configured tag.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    /// Candidate identifier (assigned by the caller for idempotency).
    pub candidate_id: String,
    /// Candidate kind.
    pub kind: CandidateKind,
    /// Optional payload text; absent payloads are drafted by synthesis.
    pub payload: Option<String>,
    /// Declared principles.
    #[serde(default)]
    pub principles: Vec<String>,
    /// Declared risk class.
    pub risk: RiskClass,
    /// Submitter's constitutional identifier.
    pub constitutional_identifier: String,
    /// Structured request attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Candidate submission response.
///
/// # Invariants
/// - `state` is the candidate's resting state at response time.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    /// Candidate identifier.
    pub candidate_id: String,
    /// Resting lifecycle state.
    pub state: String,
    /// Decision verdict, when evaluation ran.
    pub verdict: Option<String>,
    /// Review identifier, when the candidate went to review.
    pub review_id: Option<String>,
    /// Review deadline, when the candidate went to review.
    pub review_deadline: Option<Timestamp>,
    /// Reasons the candidate was routed to review.
    pub review_reasons: Vec<String>,
}

impl SubmitResponse {
    /// Builds a response from a candidate report.
    fn from_report(report: &CandidateReport) -> Self {
        Self {
            candidate_id: report.candidate.candidate_id.to_string(),
            state: report.state.as_str().to_string(),
            verdict: report.decision.as_ref().map(|decision| decision.verdict.to_string()),
            review_id: report.review.as_ref().map(|review| review.review_id.to_string()),
            review_deadline: report.review.as_ref().map(|review| review.deadline),
            review_reasons: report.review_reasons.clone(),
        }
    }
}

/// Maps a resting candidate state onto the contract status code.
const fn status_for_state(state: CandidateState) -> StatusCode {
    match state {
        CandidateState::Committed | CandidateState::Approved => StatusCode::OK,
        CandidateState::Denied | CandidateState::RolledBack => StatusCode::FORBIDDEN,
        CandidateState::InReview => StatusCode::ACCEPTED,
        CandidateState::Received
        | CandidateState::Synthesised
        | CandidateState::Verified
        | CandidateState::Evaluated => StatusCode::ACCEPTED,
    }
}

/// Maps an orchestrator error onto the contract status code.
fn status_for_error(error: &OrchestratorError) -> StatusCode {
    match error {
        OrchestratorError::ConstitutionalMismatch(_) => StatusCode::CONFLICT,
        OrchestratorError::UnknownCandidate(_) | OrchestratorError::UnknownReview(_) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::Audit(_) | OrchestratorError::Review(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `POST /v1/candidates`: submit a candidate for a governance decision.
async fn submit_candidate(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> (StatusCode, Json<Value>) {
    let tag = match ConstitutionalTag::parse(request.constitutional_identifier.clone()) {
        Ok(tag) => tag,
        Err(err) => {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": err.to_string()})),
            );
        }
    };
    let candidate = Candidate {
        candidate_id: CandidateId::new(request.candidate_id.clone()),
        kind: request.kind,
        payload: request.payload.map_or(CandidatePayload::Empty, |content| {
            CandidatePayload::Text {
                content,
            }
        }),
        principles: request.principles,
        risk: request.risk,
        submitter: tag,
        submitted_at: Timestamp::now(),
        attributes: request.attributes,
    };

    match state.orchestrator.submit(candidate).await {
        Ok(report) => {
            let status = status_for_state(report.state);
            let body = serde_json::to_value(SubmitResponse::from_report(&report))
                .unwrap_or_else(|_| serde_json::json!({"state": report.state.as_str()}));
            (status, Json(body))
        }
        Err(err) => {
            let status = status_for_error(&err);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(error = %err, "candidate submission failed");
            }
            (status, Json(serde_json::json!({"error": err.to_string()})))
        }
    }
}

/// `GET /v1/decisions/{candidate_id}`: query a candidate's decision.
async fn query_decision(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let candidate_id = CandidateId::new(candidate_id);
    match state.orchestrator.report(&candidate_id).await {
        Some(report) => {
            let status = status_for_state(report.state);
            let body = serde_json::json!({
                "candidate_id": report.candidate.candidate_id.as_str(),
                "state": report.state.as_str(),
                "decision": report.decision,
                "verification": report.verification,
                "review": report.review,
            });
            (status, Json(body))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "unknown candidate"})),
        ),
    }
}

/// `GET /v1/candidates/{candidate_id}/progress`: stream state transitions.
async fn subscribe_progress(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let candidate_id = CandidateId::new(candidate_id);
    let orchestrator = Arc::clone(&state.orchestrator);

    let interval = tokio::time::interval(PROGRESS_POLL_INTERVAL);
    let mut last_seen: u64 = 0;
    let mut settled = false;
    let stream = IntervalStream::new(interval)
        .then(move |_| {
            let orchestrator = Arc::clone(&orchestrator);
            let candidate_id = candidate_id.clone();
            async move { orchestrator.report(&candidate_id).await }
        })
        .map(move |report| {
            if settled {
                return None;
            }
            let event = report.map_or_else(
                || Event::default().event("unknown").data("{}"),
                |report| {
                    settled = report.state.is_terminal();
                    let fresh: Vec<String> = report
                        .transitions
                        .iter()
                        .filter(|transition| transition.seq > last_seen)
                        .map(|transition| transition.to.as_str().to_string())
                        .collect();
                    last_seen = report
                        .transitions
                        .last()
                        .map_or(last_seen, |transition| transition.seq);
                    let payload = serde_json::json!({
                        "state": report.state.as_str(),
                        "new_transitions": fresh,
                    });
                    Event::default().event("progress").data(payload.to_string())
                },
            );
            Some(Ok(event))
        })
        .take_while(Option::is_some)
        .filter_map(std::convert::identity);
    Sse::new(stream)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use covenant_core::runtime::CandidateState;

    use super::status_for_state;

    #[test]
    fn status_mapping_follows_the_contract() {
        assert_eq!(status_for_state(CandidateState::Committed), StatusCode::OK);
        assert_eq!(status_for_state(CandidateState::Approved), StatusCode::OK);
        assert_eq!(status_for_state(CandidateState::Denied), StatusCode::FORBIDDEN);
        assert_eq!(status_for_state(CandidateState::RolledBack), StatusCode::FORBIDDEN);
        assert_eq!(status_for_state(CandidateState::InReview), StatusCode::ACCEPTED);
    }
}
