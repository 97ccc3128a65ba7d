// crates/covenant-cache/src/cache.rs
// ============================================================================
// Module: Two-Tier Decision Cache
// Description: Sharded L1 LRU over an optional shared L2 tier.
// Purpose: Serve verified cached values with strict miss-on-mismatch.
// Dependencies: crate::{entry, shared}, covenant-core, lru, tokio
// ============================================================================

//! ## Overview
//! `get` checks L1 first, then L2 with promotion. Expired entries are
//! evicted on access; integrity mismatches are evicted silently, reported
//! to the audit log, and returned as misses. `set` honors the per-kind
//! write strategy. The cache is never authoritative: every value it holds
//! is recomputable by the component that produced it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::hash::BuildHasher;
use std::hash::Hasher;
use std::hash::RandomState;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use covenant_core::AuditActor;
use covenant_core::AuditEventDraft;
use covenant_core::AuditEventKind;
use covenant_core::ConstitutionalTag;
use covenant_core::HashError;
use covenant_core::Timestamp;
use covenant_core::interfaces::AuditSink;
use lru::LruCache;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::entry::CacheEntry;
use crate::entry::CacheKind;
use crate::entry::WriteStrategy;
use crate::shared::SharedCache;
use crate::shared::SharedCacheError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Decision cache errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value failed to canonicalize for integrity hashing.
    #[error("cache hashing error: {0}")]
    Hashing(#[from] HashError),
    /// Shared-tier failure.
    #[error("cache shared tier error: {0}")]
    Shared(#[from] SharedCacheError),
    /// L1 shard lock was poisoned.
    #[error("cache shard poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Configuration and Stats
// ============================================================================

/// Decision cache configuration.
///
/// # Invariants
/// - `l1_capacity` and `shards` are positive.
#[derive(Debug, Clone)]
pub struct DecisionCacheConfig {
    /// Total L1 capacity in entries (split across shards).
    pub l1_capacity: usize,
    /// Number of L1 shards.
    pub shards: usize,
    /// Default TTL in milliseconds when the caller supplies none.
    pub default_ttl_millis: u64,
    /// Constitutional tag stamped on cache-integrity audit events.
    pub tag: ConstitutionalTag,
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            shards: 8,
            default_ttl_millis: 300_000,
            tag: ConstitutionalTag::deployment_default(),
        }
    }
}

/// Point-in-time cache statistics snapshot.
///
/// # Invariants
/// - Counters are monotonic since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct CacheStats {
    /// L1 hits.
    pub l1_hits: u64,
    /// L2 hits (promotions).
    pub l2_hits: u64,
    /// Misses across both tiers.
    pub misses: u64,
    /// Capacity evictions from L1.
    pub evictions: u64,
    /// TTL expirations observed on access.
    pub expirations: u64,
    /// Integrity-digest failures converted into misses.
    pub integrity_failures: u64,
}

/// Internal atomic counters backing [`CacheStats`].
#[derive(Debug, Default)]
struct Counters {
    /// L1 hits.
    l1_hits: AtomicU64,
    /// L2 hits.
    l2_hits: AtomicU64,
    /// Misses.
    misses: AtomicU64,
    /// Capacity evictions.
    evictions: AtomicU64,
    /// TTL expirations.
    expirations: AtomicU64,
    /// Integrity failures.
    integrity_failures: AtomicU64,
}

// ============================================================================
// SECTION: Decision Cache
// ============================================================================

/// Two-tier decision cache.
///
/// # Invariants
/// - A served value always passed its integrity check at serve time.
/// - L2 is optional; without it the cache degrades to L1-only semantics.
pub struct DecisionCache {
    /// Cache configuration.
    config: DecisionCacheConfig,
    /// L1 shards.
    shards: Vec<Mutex<LruCache<String, CacheEntry>>>,
    /// Shard selector hasher state.
    hasher: RandomState,
    /// Optional shared L2 tier.
    l2: Option<Arc<dyn SharedCache>>,
    /// Optional audit sink for integrity events.
    audit: Option<Arc<dyn AuditSink>>,
    /// Keys awaiting a write-back flush.
    dirty: Mutex<Vec<String>>,
    /// Statistics counters.
    counters: Counters,
}

impl DecisionCache {
    /// Creates a cache with the given tiers.
    #[must_use]
    pub fn new(
        config: DecisionCacheConfig,
        l2: Option<Arc<dyn SharedCache>>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Self {
        let shard_count = config.shards.max(1);
        let per_shard = (config.l1_capacity / shard_count).max(1);
        let capacity = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);
        let shards = (0 .. shard_count).map(|_| Mutex::new(LruCache::new(capacity))).collect();
        Self {
            config,
            shards,
            hasher: RandomState::new(),
            l2,
            audit,
            dirty: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    /// Fetches a verified, unexpired entry by key.
    ///
    /// Integrity mismatches and TTL expirations are treated as misses; the
    /// offending copies are evicted along the way.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Timestamp::now();

        match self.l1_take_valid(key, now) {
            L1Lookup::Hit(entry) => {
                self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry);
            }
            L1Lookup::IntegrityFailure => {
                self.report_integrity_failure(key, "l1").await;
            }
            L1Lookup::Miss => {}
        }

        if let Some(l2) = &self.l2 {
            match l2.fetch(key).await {
                Ok(Some(entry)) => {
                    if entry.is_expired(now) {
                        self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                        let _ = l2.remove(key).await;
                    } else if entry.verify_integrity().unwrap_or(false) {
                        self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                        self.l1_insert(key, entry.clone());
                        return Some(entry);
                    } else {
                        let _ = l2.remove(key).await;
                        self.report_integrity_failure(key, "l2").await;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(error = %err, key, "l2 fetch failed; treating as miss");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores a value under the kind's default write strategy.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when hashing fails or a write-through L2
    /// store fails.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        kind: CacheKind,
        ttl_millis: Option<u64>,
    ) -> Result<(), CacheError> {
        self.set_with_strategy(key, value, kind, ttl_millis, kind.write_strategy()).await
    }

    /// Stores a value under an explicit write strategy.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when hashing fails or a write-through L2
    /// store fails.
    pub async fn set_with_strategy(
        &self,
        key: &str,
        value: Value,
        kind: CacheKind,
        ttl_millis: Option<u64>,
        strategy: WriteStrategy,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(
            value,
            kind,
            self.config.tag.clone(),
            Timestamp::now(),
            ttl_millis.unwrap_or(self.config.default_ttl_millis),
        )?;
        self.l1_insert(key, entry.clone());

        match strategy {
            WriteStrategy::WriteThrough => {
                if let Some(l2) = &self.l2 {
                    l2.store(key, &entry).await?;
                }
            }
            WriteStrategy::WriteBack => {
                self.dirty.lock().map_err(|_| CacheError::Poisoned)?.push(key.to_string());
            }
            WriteStrategy::L1Only => {}
        }
        Ok(())
    }

    /// Deletes a key from both tiers.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Shared`] when the L2 removal fails.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if let Ok(mut shard) = self.shard(key).lock() {
            shard.pop(key);
        }
        if let Some(l2) = &self.l2 {
            l2.remove(key).await?;
        }
        Ok(())
    }

    /// Flushes write-back entries to L2.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when a flush store fails; remaining keys stay
    /// queued.
    pub async fn flush(&self) -> Result<usize, CacheError> {
        let keys: Vec<String> = {
            let mut dirty = self.dirty.lock().map_err(|_| CacheError::Poisoned)?;
            std::mem::take(&mut *dirty)
        };
        let Some(l2) = &self.l2 else {
            return Ok(0);
        };
        let mut flushed = 0;
        for key in keys {
            let entry = {
                let Ok(shard) = self.shard(&key).lock() else {
                    continue;
                };
                shard.peek(&key).cloned()
            };
            if let Some(entry) = entry {
                l2.store(&key, &entry).await?;
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Returns a statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            integrity_failures: self.counters.integrity_failures.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of live L1 entries across shards.
    #[must_use]
    pub fn l1_len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().map(|guard| guard.len()).unwrap_or(0))
            .sum()
    }

    // ------------------------------------------------------------------
    // L1 internals
    // ------------------------------------------------------------------

    /// Inserts into the owning shard, counting capacity evictions.
    fn l1_insert(&self, key: &str, entry: CacheEntry) {
        if let Ok(mut shard) = self.shard(key).lock() {
            let evicted = shard.push(key.to_string(), entry);
            if let Some((evicted_key, _)) = evicted
                && evicted_key != key
            {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Looks up a key in L1, evicting expired or corrupt copies.
    fn l1_take_valid(&self, key: &str, now: Timestamp) -> L1Lookup {
        let Ok(mut shard) = self.shard(key).lock() else {
            return L1Lookup::Miss;
        };
        let Some(entry) = shard.get(key) else {
            return L1Lookup::Miss;
        };
        if entry.is_expired(now) {
            shard.pop(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            return L1Lookup::Miss;
        }
        if entry.verify_integrity().unwrap_or(false) {
            L1Lookup::Hit(entry.clone())
        } else {
            shard.pop(key);
            L1Lookup::IntegrityFailure
        }
    }

    /// Returns the shard owning a key.
    fn shard(&self, key: &str) -> &Mutex<LruCache<String, CacheEntry>> {
        let mut hasher = self.hasher.build_hasher();
        hasher.write(key.as_bytes());
        let bucket = hasher.finish() % self.shards.len() as u64;
        let index = usize::try_from(bucket).unwrap_or(0);
        &self.shards[index]
    }

    /// Emits a cache-integrity audit event and bumps the failure counter.
    async fn report_integrity_failure(&self, key: &str, tier: &str) {
        self.counters.integrity_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(audit) = &self.audit {
            let draft = AuditEventDraft {
                actor: AuditActor::Cache,
                kind: AuditEventKind::CacheIntegrity,
                payload: json!({"key": key, "tier": tier}),
                timestamp: Timestamp::now(),
                tag: self.config.tag.clone(),
            };
            if let Err(err) = audit.append(draft).await {
                debug!(error = %err, "failed to audit cache integrity failure");
            }
        }
    }
}

/// Outcome of an L1 lookup.
enum L1Lookup {
    /// Verified, unexpired entry.
    Hit(CacheEntry),
    /// Entry was corrupt and has been evicted.
    IntegrityFailure,
    /// No usable entry.
    Miss,
}
