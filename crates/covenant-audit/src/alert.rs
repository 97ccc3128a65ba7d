// crates/covenant-audit/src/alert.rs
// ============================================================================
// Module: Audit Rate Alerting
// Description: Per-kind event-rate thresholds over sliding windows.
// Purpose: Raise alert events on rate breaches without alert recursion.
// Dependencies: covenant-core
// ============================================================================

//! ## Overview
//! Rate alerting is layered on top of the append path: each committed event
//! bumps a per-kind sliding window, and a window that crosses its threshold
//! raises one audit event of kind `alert`. Alert emission is itself
//! rate-limited (one alert per kind per window) so alert events can never
//! feed back into an alert storm.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;

use covenant_core::AuditEventKind;
use covenant_core::Timestamp;

// ============================================================================
// SECTION: Rate Alerter
// ============================================================================

/// Sliding-window rate alerter keyed by event kind.
///
/// # Invariants
/// - `alert` kind events are never counted, so alerts cannot recurse.
/// - At most one alert per kind per window is raised.
#[derive(Debug)]
pub struct RateAlerter {
    /// Events of one kind within the window that trigger an alert.
    threshold: u64,
    /// Window length in milliseconds.
    window_millis: u64,
    /// Per-kind timestamps of recent events.
    windows: BTreeMap<AuditEventKind, VecDeque<Timestamp>>,
    /// Per-kind timestamp of the last raised alert.
    last_alert: BTreeMap<AuditEventKind, Timestamp>,
}

impl RateAlerter {
    /// Creates an alerter with the given threshold and window.
    #[must_use]
    pub const fn new(threshold: u64, window_millis: u64) -> Self {
        Self {
            threshold,
            window_millis,
            windows: BTreeMap::new(),
            last_alert: BTreeMap::new(),
        }
    }

    /// Records one committed event and reports whether an alert is due.
    ///
    /// Returns the kind to alert on when the event pushed its kind over the
    /// threshold and no alert was raised within the current window.
    pub fn observe(&mut self, kind: AuditEventKind, at: Timestamp) -> Option<AuditEventKind> {
        if kind == AuditEventKind::Alert {
            return None;
        }

        let window = self.windows.entry(kind).or_default();
        window.push_back(at);
        let window_millis = i64::try_from(self.window_millis).unwrap_or(i64::MAX);
        while let Some(front) = window.front() {
            if at.millis_since(*front) > window_millis {
                window.pop_front();
            } else {
                break;
            }
        }

        if (window.len() as u64) < self.threshold {
            return None;
        }
        if let Some(last) = self.last_alert.get(&kind)
            && at.millis_since(*last) <= window_millis
        {
            return None;
        }
        self.last_alert.insert(kind, at);
        Some(kind)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
