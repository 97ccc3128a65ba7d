// crates/covenant-core/src/core/time.rs
// ============================================================================
// Module: Covenant Time Model
// Description: Canonical timestamp representation for governance records.
// Purpose: Provide explicit, serializable time values across Covenant records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Covenant embeds explicit unix-millisecond timestamps in every record so
//! that audit chains and decision logs replay deterministically. Components
//! obtain wall-clock time at their boundaries via [`Timestamp::now`]; pure
//! evaluation code receives timestamps as arguments and never reads the
//! clock directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp: unix epoch milliseconds, UTC.
///
/// # Invariants
/// - Monotonicity within a record stream is the writer's responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        Self(clamp_to_i64(millis))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the whole-millisecond difference `self - earlier`.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns a timestamp advanced by the given number of milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Formats the timestamp as RFC 3339 when representable.
    #[must_use]
    pub fn to_rfc3339(self) -> Option<String> {
        let nanos = i128::from(self.0).checked_mul(1_000_000)?;
        let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
        datetime.format(&Rfc3339).ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(formatted) => f.write_str(&formatted),
            None => self.0.fmt(f),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Clamps a 128-bit millisecond count into the i64 range.
const fn clamp_to_i64(value: i128) -> i64 {
    if value > i64::MAX as i128 {
        i64::MAX
    } else if value < i64::MIN as i128 {
        i64::MIN
    } else {
        #[allow(clippy::cast_possible_truncation, reason = "bounds checked above")]
        {
            value as i64
        }
    }
}
