// crates/covenant-cache/src/entry.rs
// ============================================================================
// Module: Cache Entries
// Description: Integrity-checked cache values, kinds, and write strategies.
// Purpose: Make every cached value verifiable before it is served.
// Dependencies: covenant-core, serde
// ============================================================================

//! ## Overview
//! A cache entry wraps an opaque JSON value with the constitutional tag, a
//! store timestamp, a TTL, and an integrity digest over value and tag.
//! Cache kinds choose their write strategy: hot read-mostly kinds write
//! through to L2, ephemeral kinds stay in L1.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_core::ConstitutionalTag;
use covenant_core::DEFAULT_HASH_ALGORITHM;
use covenant_core::HashDigest;
use covenant_core::HashError;
use covenant_core::Timestamp;
use covenant_core::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Cache Kinds
// ============================================================================

/// Kind of cached value, selecting TTL defaults and write strategy.
///
/// # Invariants
/// - Variants are stable for serialization and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Policy decision records.
    Decision,
    /// Verification obligation results.
    Verification,
    /// Performance metric snapshots.
    Metrics,
    /// Bandit arm state snapshots.
    BanditState,
}

impl CacheKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Verification => "verification",
            Self::Metrics => "metrics",
            Self::BanditState => "bandit_state",
        }
    }

    /// Write strategy for the kind: read-mostly kinds write through; bandit
    /// state is ephemeral and stays in L1.
    #[must_use]
    pub const fn write_strategy(self) -> WriteStrategy {
        match self {
            Self::Decision | Self::Verification | Self::Metrics => WriteStrategy::WriteThrough,
            Self::BanditState => WriteStrategy::L1Only,
        }
    }
}

/// Write strategy applied on `set`.
///
/// # Invariants
/// - Variants are stable for serialization and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Write L1 and L2 synchronously.
    WriteThrough,
    /// Write L1 now; flush to L2 on demand.
    WriteBack,
    /// Write L1 only.
    L1Only,
}

// ============================================================================
// SECTION: Cache Entry
// ============================================================================

/// Integrity-checked cache value.
///
/// # Invariants
/// - `integrity` covers `(value, tag)`; a mismatch invalidates the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Stored JSON value.
    pub value: Value,
    /// Cache kind.
    pub kind: CacheKind,
    /// Constitutional tag of the writer.
    pub tag: ConstitutionalTag,
    /// Store timestamp.
    pub stored_at: Timestamp,
    /// Time-to-live in milliseconds.
    pub ttl_millis: u64,
    /// Integrity digest over value and tag.
    pub integrity: HashDigest,
}

impl CacheEntry {
    /// Creates an entry, computing its integrity digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the value fails to canonicalize.
    pub fn new(
        value: Value,
        kind: CacheKind,
        tag: ConstitutionalTag,
        stored_at: Timestamp,
        ttl_millis: u64,
    ) -> Result<Self, HashError> {
        let integrity = integrity_digest(&value, &tag)?;
        Ok(Self {
            value,
            kind,
            tag,
            stored_at,
            ttl_millis,
            integrity,
        })
    }

    /// Verifies the stored integrity digest.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the value fails to canonicalize; a clean
    /// `Ok(false)` means the digest did not match.
    pub fn verify_integrity(&self) -> Result<bool, HashError> {
        Ok(integrity_digest(&self.value, &self.tag)? == self.integrity)
    }

    /// Returns true when the entry has outlived its TTL at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now.millis_since(self.stored_at) > i64::try_from(self.ttl_millis).unwrap_or(i64::MAX)
    }
}

/// Computes the integrity digest over a value and tag.
fn integrity_digest(value: &Value, tag: &ConstitutionalTag) -> Result<HashDigest, HashError> {
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &(value, tag.as_str()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
