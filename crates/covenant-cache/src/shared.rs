// crates/covenant-cache/src/shared.rs
// ============================================================================
// Module: Shared Cache Tier
// Description: L2 key-value abstraction with optional LZ4 compression.
// Purpose: Share cached values across processes behind one async trait.
// Dependencies: covenant-core, lz4_flex, serde_json, tokio, async-trait
// ============================================================================

//! ## Overview
//! The L2 tier abstracts a network key-value store. Entries are serialized
//! to JSON and, above a size threshold, LZ4-compressed. Consistency is
//! eventual: readers tolerate stale data because every entry re-verifies
//! its integrity digest on promotion into L1.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::entry::CacheEntry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Serialized entries above this size are LZ4-compressed.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 4 * 1024;
/// Marker byte prefixed to compressed blobs.
const COMPRESSED_MARKER: u8 = 1;
/// Marker byte prefixed to plain blobs.
const PLAIN_MARKER: u8 = 0;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Shared-tier errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SharedCacheError {
    /// Backend transport failure.
    #[error("shared cache backend error: {0}")]
    Backend(String),
    /// Stored blob failed to decode.
    #[error("shared cache decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Shared Cache Trait
// ============================================================================

/// Shared (L2) cache tier.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetches an entry by key.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] on transport or decode failure.
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, SharedCacheError>;

    /// Stores an entry by key.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] on transport failure.
    async fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), SharedCacheError>;

    /// Removes an entry by key.
    ///
    /// # Errors
    ///
    /// Returns [`SharedCacheError`] on transport failure.
    async fn remove(&self, key: &str) -> Result<(), SharedCacheError>;
}

// ============================================================================
// SECTION: Blob Encoding
// ============================================================================

/// Encodes an entry to a blob, compressing above the threshold.
///
/// # Errors
///
/// Returns [`SharedCacheError::Decode`] when serialization fails.
pub fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, SharedCacheError> {
    let json = serde_json::to_vec(entry).map_err(|err| SharedCacheError::Decode(err.to_string()))?;
    if json.len() > COMPRESSION_THRESHOLD_BYTES {
        let mut blob = vec![COMPRESSED_MARKER];
        blob.extend_from_slice(&lz4_flex::compress_prepend_size(&json));
        Ok(blob)
    } else {
        let mut blob = vec![PLAIN_MARKER];
        blob.extend_from_slice(&json);
        Ok(blob)
    }
}

/// Decodes a blob back into an entry.
///
/// # Errors
///
/// Returns [`SharedCacheError::Decode`] when the blob is malformed.
pub fn decode_entry(blob: &[u8]) -> Result<CacheEntry, SharedCacheError> {
    let (marker, body) = blob
        .split_first()
        .ok_or_else(|| SharedCacheError::Decode("empty blob".to_string()))?;
    let json = match *marker {
        PLAIN_MARKER => body.to_vec(),
        COMPRESSED_MARKER => lz4_flex::decompress_size_prepended(body)
            .map_err(|err| SharedCacheError::Decode(err.to_string()))?,
        other => {
            return Err(SharedCacheError::Decode(format!("unknown blob marker {other}")));
        }
    };
    serde_json::from_slice(&json).map_err(|err| SharedCacheError::Decode(err.to_string()))
}

// ============================================================================
// SECTION: Memory Shared Cache
// ============================================================================

/// In-memory shared tier for tests and single-node deployments.
///
/// # Invariants
/// - Values round-trip through the blob encoding so compression is
///   exercised exactly as a network store would.
#[derive(Debug, Default)]
pub struct MemorySharedCache {
    /// Encoded blobs keyed by cache key.
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SharedCache for MemorySharedCache {
    async fn fetch(&self, key: &str) -> Result<Option<CacheEntry>, SharedCacheError> {
        let blobs = self.blobs.read().await;
        blobs.get(key).map(|blob| decode_entry(blob)).transpose()
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), SharedCacheError> {
        let blob = encode_entry(entry)?;
        self.blobs.write().await.insert(key.to_string(), blob);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SharedCacheError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use covenant_core::ConstitutionalTag;
    use covenant_core::Timestamp;
    use serde_json::json;

    use super::decode_entry;
    use super::encode_entry;
    use crate::entry::CacheEntry;
    use crate::entry::CacheKind;

    #[test]
    fn small_entries_stay_plain_and_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let entry = CacheEntry::new(
            json!({"verdict": "allow"}),
            CacheKind::Decision,
            ConstitutionalTag::deployment_default(),
            Timestamp::from_unix_millis(0),
            1_000,
        )?;
        let blob = encode_entry(&entry)?;
        assert_eq!(blob.first(), Some(&0));
        assert_eq!(decode_entry(&blob)?, entry);
        Ok(())
    }

    #[test]
    fn large_entries_compress_and_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let entry = CacheEntry::new(
            json!({"trace": "x".repeat(16 * 1024)}),
            CacheKind::Verification,
            ConstitutionalTag::deployment_default(),
            Timestamp::from_unix_millis(0),
            1_000,
        )?;
        let blob = encode_entry(&entry)?;
        assert_eq!(blob.first(), Some(&1));
        assert!(blob.len() < 16 * 1024);
        assert_eq!(decode_entry(&blob)?, entry);
        Ok(())
    }
}
