// crates/covenant-server/src/lib.rs
// ============================================================================
// Module: Covenant Ingress Server
// Description: HTTP surface for candidate submission and decision queries.
// Purpose: Expose the orchestrator contract with strict identity checks.
// Dependencies: covenant-core, axum, tokio-stream
// ============================================================================

//! ## Overview
//! The ingress surface is deliberately thin: it decodes wire requests,
//! enforces the constitutional tag, delegates to the orchestrator, and
//! maps terminal states onto status codes (approved 200, denied 403,
//! in-review 202, constitutional mismatch 409, internal failure 500).
//! Progress subscriptions stream state transitions as server-sent events
//! until the candidate settles.

pub mod wire;

pub use wire::AppState;
pub use wire::SubmitRequest;
pub use wire::SubmitResponse;
pub use wire::router;
