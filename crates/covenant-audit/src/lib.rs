// crates/covenant-audit/src/lib.rs
// ============================================================================
// Module: Covenant Audit Log
// Description: Append-only, hash-chained audit log with durable backends.
// Purpose: Commit every governance event before its operation is acknowledged.
// Dependencies: covenant-core, serde_json, tokio, thiserror
// ============================================================================

//! ## Overview
//! The audit log is the commit point of the governance runtime: an append is
//! durable before the originating operation is acknowledged, and a failed
//! append fails that operation. Appends are serialized through a single
//! writer worker fed by a bounded channel; a full channel surfaces
//! backpressure to the caller instead of queueing silently. Events are
//! hash-chained and verified from genesis on startup and on demand.

pub mod alert;
pub mod backend;
pub mod log;

pub use alert::RateAlerter;
pub use backend::AuditBackend;
pub use backend::BackendError;
pub use backend::FileBackend;
pub use backend::MemoryBackend;
pub use log::AuditLog;
pub use log::AuditLogConfig;
pub use log::ChainViolation;
