// crates/covenant-audit/src/log.rs
// ============================================================================
// Module: Audit Log Core
// Description: Serialized append, chain verification, retention, alerting.
// Purpose: Make every audit append durable and tamper-evident before ack.
// Dependencies: crate::{alert, backend}, covenant-core, tokio
// ============================================================================

//! ## Overview
//! All appends flow through one writer worker that owns the backend and the
//! chain state, fed by a bounded channel. The worker assigns the next
//! sequence, links the prior digest, computes the chain digest, persists the
//! event, and only then acknowledges the caller. Startup reconciliation
//! replays the stored chain and refuses to open a log whose tail diverges.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use covenant_core::AuditActor;
use covenant_core::AuditEvent;
use covenant_core::AuditEventDraft;
use covenant_core::AuditEventKind;
use covenant_core::ConstitutionalTag;
use covenant_core::HashDigest;
use covenant_core::Timestamp;
use covenant_core::core::hashing::chain_digest;
use covenant_core::interfaces::AuditError;
use covenant_core::interfaces::AuditSink;
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::error;

use crate::alert::RateAlerter;
use crate::backend::AuditBackend;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per retention day.
const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Audit log configuration.
///
/// # Invariants
/// - Retention windows honor the spec floors (90 / 365 days).
#[derive(Debug, Clone)]
pub struct AuditLogConfig {
    /// Constitutional tag required on every draft.
    pub tag: ConstitutionalTag,
    /// Bounded append-channel capacity.
    pub channel_capacity: usize,
    /// Retention for security-class events, in days.
    pub retention_security_days: u32,
    /// Retention for constitutional-class events, in days.
    pub retention_constitutional_days: u32,
    /// Alert threshold: events of one kind within the alert window.
    pub alert_threshold: u64,
    /// Alert window in milliseconds.
    pub alert_window_millis: u64,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            tag: ConstitutionalTag::deployment_default(),
            channel_capacity: 1_024,
            retention_security_days: 90,
            retention_constitutional_days: 365,
            alert_threshold: 100,
            alert_window_millis: 60_000,
        }
    }
}

// ============================================================================
// SECTION: Chain Violations
// ============================================================================

/// One detected break in the hash chain.
///
/// # Invariants
/// - `sequence` identifies the first event at which the chain diverged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audit chain broken at sequence {sequence}: {detail}")]
pub struct ChainViolation {
    /// Sequence number of the offending event.
    pub sequence: u64,
    /// Violation detail.
    pub detail: String,
}

// ============================================================================
// SECTION: Worker Commands
// ============================================================================

/// Commands processed by the writer worker.
enum Command {
    /// Append a draft and reply with the committed event.
    Append {
        /// Draft to commit.
        draft: AuditEventDraft,
        /// Reply channel.
        reply: oneshot::Sender<Result<AuditEvent, AuditError>>,
    },
    /// Read the last `n` events.
    Tail {
        /// Number of events to return.
        count: usize,
        /// Reply channel.
        reply: oneshot::Sender<Vec<AuditEvent>>,
    },
    /// Read events with sequences in `[lo, hi]`.
    Range {
        /// Inclusive lower sequence bound.
        lo: u64,
        /// Inclusive upper sequence bound.
        hi: u64,
        /// Reply channel.
        reply: oneshot::Sender<Vec<AuditEvent>>,
    },
    /// Recompute the chain from the checkpoint.
    Verify {
        /// Reply channel.
        reply: oneshot::Sender<Result<u64, ChainViolation>>,
    },
    /// Drop the fully-expired prefix per retention policy.
    Prune {
        /// Current time used for expiry checks.
        now: Timestamp,
        /// Reply channel carrying the number of dropped events.
        reply: oneshot::Sender<Result<usize, AuditError>>,
    },
}

// ============================================================================
// SECTION: Audit Log Handle
// ============================================================================

/// Handle to the audit log writer worker.
///
/// # Invariants
/// - Appends are totally ordered by the worker; the channel is bounded and
///   a full channel is a caller error, never a silent queue.
#[derive(Clone)]
pub struct AuditLog {
    /// Bounded command channel into the writer worker.
    tx: mpsc::Sender<Command>,
    /// Configured constitutional tag.
    tag: ConstitutionalTag,
}

impl AuditLog {
    /// Opens the log over a backend, reconciling the stored chain.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::LogBroken`] when the stored chain fails
    /// verification, and [`AuditError::AppendFailed`] for backend failures.
    pub fn open(
        config: AuditLogConfig,
        mut backend: Box<dyn AuditBackend>,
    ) -> Result<Self, AuditError> {
        let events = backend.load().map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        verify_events(&events).map_err(|violation| AuditError::LogBroken(violation.to_string()))?;

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let tag = config.tag.clone();
        let worker = Worker {
            config,
            backend,
            events,
        };
        tokio::spawn(worker.run(rx));
        Ok(Self {
            tx,
            tag,
        })
    }

    /// Appends a draft, returning the committed event once durable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Backpressure`] when the channel is full,
    /// [`AuditError::ConstitutionalMismatch`] on a tag mismatch, and
    /// [`AuditError::AppendFailed`] when persistence fails.
    pub async fn append_event(&self, draft: AuditEventDraft) -> Result<AuditEvent, AuditError> {
        if draft.tag != self.tag {
            return Err(AuditError::ConstitutionalMismatch(draft.tag.to_string()));
        }
        let (reply, response) = oneshot::channel();
        self.tx
            .try_send(Command::Append {
                draft,
                reply,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => AuditError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => {
                    AuditError::AppendFailed("audit worker stopped".to_string())
                }
            })?;
        response
            .await
            .map_err(|_| AuditError::AppendFailed("audit worker dropped reply".to_string()))?
    }

    /// Returns the last `count` events.
    pub async fn tail(&self, count: usize) -> Vec<AuditEvent> {
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(Command::Tail {
                count,
                reply,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Returns events with sequences in `[lo, hi]`.
    pub async fn range(&self, lo: u64, hi: u64) -> Vec<AuditEvent> {
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(Command::Range {
                lo,
                hi,
                reply,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Recomputes the chain from the checkpoint, returning the event count.
    ///
    /// # Errors
    ///
    /// Returns [`ChainViolation`] at the first diverging event.
    pub async fn verify_chain(&self) -> Result<u64, ChainViolation> {
        let (reply, response) = oneshot::channel();
        if self
            .tx
            .send(Command::Verify {
                reply,
            })
            .await
            .is_err()
        {
            return Err(ChainViolation {
                sequence: 0,
                detail: "audit worker stopped".to_string(),
            });
        }
        response.await.unwrap_or_else(|_| {
            Err(ChainViolation {
                sequence: 0,
                detail: "audit worker dropped reply".to_string(),
            })
        })
    }

    /// Drops the longest fully-expired prefix per retention policy.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AppendFailed`] when compaction fails.
    pub async fn prune(&self, now: Timestamp) -> Result<usize, AuditError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Prune {
                now,
                reply,
            })
            .await
            .map_err(|_| AuditError::AppendFailed("audit worker stopped".to_string()))?;
        response
            .await
            .map_err(|_| AuditError::AppendFailed("audit worker dropped reply".to_string()))?
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn append(&self, draft: AuditEventDraft) -> Result<HashDigest, AuditError> {
        self.append_event(draft).await.map(|event| event.digest)
    }
}

// ============================================================================
// SECTION: Writer Worker
// ============================================================================

/// Writer worker owning the backend, chain state, and alerter.
struct Worker {
    /// Log configuration.
    config: AuditLogConfig,
    /// Storage backend.
    backend: Box<dyn AuditBackend>,
    /// Committed events (in memory for tail/range/verify).
    events: Vec<AuditEvent>,
}

impl Worker {
    /// Runs the worker loop until every handle is dropped.
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut alerter =
            RateAlerter::new(self.config.alert_threshold, self.config.alert_window_millis);
        while let Some(command) = rx.recv().await {
            match command {
                Command::Append {
                    draft,
                    reply,
                } => {
                    let result = self.commit(draft);
                    if let Ok(event) = &result
                        && let Some(kind) = alerter.observe(event.kind, event.timestamp)
                    {
                        self.raise_alert(kind, event.timestamp);
                    }
                    let _ = reply.send(result);
                }
                Command::Tail {
                    count,
                    reply,
                } => {
                    let start = self.events.len().saturating_sub(count);
                    let _ = reply.send(self.events.get(start ..).unwrap_or_default().to_vec());
                }
                Command::Range {
                    lo,
                    hi,
                    reply,
                } => {
                    let selected = self
                        .events
                        .iter()
                        .filter(|event| event.sequence >= lo && event.sequence <= hi)
                        .cloned()
                        .collect();
                    let _ = reply.send(selected);
                }
                Command::Verify {
                    reply,
                } => {
                    let _ = reply.send(
                        verify_events(&self.events)
                            .map(|()| self.events.len() as u64),
                    );
                }
                Command::Prune {
                    now,
                    reply,
                } => {
                    let _ = reply.send(self.prune(now));
                }
            }
        }
    }

    /// Commits a draft: sequence, link, hash, persist, acknowledge.
    fn commit(&mut self, draft: AuditEventDraft) -> Result<AuditEvent, AuditError> {
        let prior = self
            .events
            .last()
            .map_or_else(HashDigest::genesis, |event| event.digest.clone());
        let sequence = self.events.last().map_or(1, |event| event.sequence + 1);
        let digest = chain_digest(&prior, &draft.payload, draft.timestamp)
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        let event = AuditEvent {
            sequence,
            prior_digest: prior,
            timestamp: draft.timestamp,
            actor: draft.actor,
            kind: draft.kind,
            payload: draft.payload,
            digest,
            tag: draft.tag,
        };
        self.backend
            .append(&event)
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        self.events.push(event.clone());
        Ok(event)
    }

    /// Raises one alert event; alert append failures are logged, not fatal.
    fn raise_alert(&mut self, kind: AuditEventKind, at: Timestamp) {
        let draft = AuditEventDraft {
            actor: AuditActor::AuditLog,
            kind: AuditEventKind::Alert,
            payload: json!({
                "breached_kind": kind.as_str(),
                "threshold": self.config.alert_threshold,
                "window_millis": self.config.alert_window_millis,
            }),
            timestamp: at,
            tag: self.config.tag.clone(),
        };
        if let Err(err) = self.commit(draft) {
            error!(error = %err, "failed to append rate alert");
        }
    }

    /// Drops the longest prefix in which every event has expired.
    fn prune(&mut self, now: Timestamp) -> Result<usize, AuditError> {
        let mut keep_from = 0;
        for event in &self.events {
            let retention_days = if event.kind.is_constitutional() {
                self.config.retention_constitutional_days
            } else {
                self.config.retention_security_days
            };
            let cutoff = i64::from(retention_days).saturating_mul(MILLIS_PER_DAY);
            if now.millis_since(event.timestamp) > cutoff {
                keep_from += 1;
            } else {
                break;
            }
        }
        if keep_from == 0 {
            return Ok(0);
        }
        // The in-memory log mutates only after the compaction is durable.
        let retained: Vec<AuditEvent> = self.events.iter().skip(keep_from).cloned().collect();
        self.backend
            .rewrite(&retained)
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        self.events = retained;
        Ok(keep_from)
    }
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Verifies sequence monotonicity, linkage, and digests over events.
///
/// The expected prior digest for the first event is whatever that event
/// recorded; after retention compaction the head of the log acts as the
/// checkpoint.
///
/// # Errors
///
/// Returns [`ChainViolation`] at the first diverging event.
pub(crate) fn verify_events(events: &[AuditEvent]) -> Result<(), ChainViolation> {
    let mut expected_prior: Option<&HashDigest> = None;
    let mut expected_sequence: Option<u64> = None;
    for event in events {
        if let Some(sequence) = expected_sequence
            && event.sequence != sequence
        {
            return Err(ChainViolation {
                sequence: event.sequence,
                detail: format!("expected sequence {sequence}"),
            });
        }
        if let Some(prior) = expected_prior
            && event.prior_digest != *prior
        {
            return Err(ChainViolation {
                sequence: event.sequence,
                detail: "prior digest does not match predecessor".to_string(),
            });
        }
        let recomputed = event.recompute_digest().map_err(|err| ChainViolation {
            sequence: event.sequence,
            detail: err.to_string(),
        })?;
        if recomputed != event.digest {
            return Err(ChainViolation {
                sequence: event.sequence,
                detail: "stored digest does not match recomputation".to_string(),
            });
        }
        expected_prior = Some(&event.digest);
        expected_sequence = Some(event.sequence + 1);
    }
    Ok(())
}
