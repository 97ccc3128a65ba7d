// crates/covenant-cache/tests/cache.rs
// ============================================================================
// Module: Decision Cache Tests
// Description: Validate tiering, TTL, eviction, and integrity semantics.
// Purpose: Ensure the cache never serves stale or corrupt values.
// Dependencies: covenant-cache, covenant-core, tokio
// ============================================================================

//! Two-tier cache behavior tests.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use covenant_cache::CacheEntry;
use covenant_cache::CacheKind;
use covenant_cache::DecisionCache;
use covenant_cache::DecisionCacheConfig;
use covenant_cache::MemorySharedCache;
use covenant_cache::SharedCache;
use covenant_cache::SharedCacheError;
use covenant_core::AuditEventDraft;
use covenant_core::AuditEventKind;
use covenant_core::ConstitutionalTag;
use covenant_core::HashDigest;
use covenant_core::Timestamp;
use covenant_core::interfaces::AuditError;
use covenant_core::interfaces::AuditSink;
use serde_json::json;

/// Audit sink capturing appended drafts.
#[derive(Default)]
struct CapturingAudit {
    /// Captured drafts.
    drafts: Mutex<Vec<AuditEventDraft>>,
}

#[async_trait]
impl AuditSink for CapturingAudit {
    async fn append(&self, draft: AuditEventDraft) -> Result<HashDigest, AuditError> {
        self.drafts
            .lock()
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?
            .push(draft);
        Ok(HashDigest::genesis())
    }
}

/// L2 double serving one fixed (possibly corrupt) entry.
struct FixedShared {
    /// Entry returned for every fetch.
    entry: CacheEntry,
}

#[async_trait]
impl SharedCache for FixedShared {
    async fn fetch(&self, _key: &str) -> Result<Option<CacheEntry>, SharedCacheError> {
        Ok(Some(self.entry.clone()))
    }

    async fn store(&self, _key: &str, _entry: &CacheEntry) -> Result<(), SharedCacheError> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<(), SharedCacheError> {
        Ok(())
    }
}

/// Small-capacity cache over a memory L2.
fn small_cache(l2: Option<Arc<dyn SharedCache>>, audit: Option<Arc<dyn AuditSink>>)
-> DecisionCache {
    DecisionCache::new(
        DecisionCacheConfig {
            l1_capacity: 4,
            shards: 1,
            default_ttl_millis: 60_000,
            tag: ConstitutionalTag::deployment_default(),
        },
        l2,
        audit,
    )
}

#[tokio::test]
async fn set_then_get_returns_the_value() -> Result<(), Box<dyn std::error::Error>> {
    let cache = small_cache(None, None);
    cache.set("k1", json!({"verdict": "allow"}), CacheKind::Decision, None).await?;
    let entry = cache.get("k1").await.ok_or("expected hit")?;
    assert_eq!(entry.value, json!({"verdict": "allow"}));
    assert_eq!(cache.stats().l1_hits, 1);
    Ok(())
}

#[tokio::test]
async fn expired_entries_miss_and_are_evicted() -> Result<(), Box<dyn std::error::Error>> {
    let cache = small_cache(None, None);
    cache.set("k1", json!(1), CacheKind::BanditState, Some(0)).await?;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(cache.get("k1").await.is_none());
    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(cache.l1_len(), 0);
    Ok(())
}

#[tokio::test]
async fn lru_capacity_evicts_oldest() -> Result<(), Box<dyn std::error::Error>> {
    let cache = small_cache(None, None);
    for index in 0 .. 6 {
        cache
            .set(&format!("k{index}"), json!(index), CacheKind::BanditState, None)
            .await?;
    }
    assert_eq!(cache.l1_len(), 4);
    assert!(cache.stats().evictions >= 2);
    // The earliest keys fell out; the newest survive.
    assert!(cache.get("k0").await.is_none());
    assert!(cache.get("k5").await.is_some());
    Ok(())
}

#[tokio::test]
async fn l2_promotion_serves_after_l1_eviction() -> Result<(), Box<dyn std::error::Error>> {
    let l2: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::default());
    let cache = small_cache(Some(Arc::clone(&l2)), None);

    // Decision entries write through to L2.
    cache.set("keep", json!({"verdict": "allow"}), CacheKind::Decision, None).await?;
    // Push enough entries to evict "keep" from the 4-slot L1.
    for index in 0 .. 8 {
        cache.set(&format!("k{index}"), json!(index), CacheKind::Decision, None).await?;
    }

    let entry = cache.get("keep").await.ok_or("expected l2 promotion")?;
    assert_eq!(entry.value, json!({"verdict": "allow"}));
    assert!(cache.stats().l2_hits >= 1);
    Ok(())
}

#[tokio::test]
async fn bandit_state_never_reaches_l2() -> Result<(), Box<dyn std::error::Error>> {
    let l2 = Arc::new(MemorySharedCache::default());
    let cache = small_cache(Some(Arc::clone(&l2) as Arc<dyn SharedCache>), None);

    cache.set("arm", json!({"pulls": 3}), CacheKind::BanditState, None).await?;
    // Evict it from L1; with no L2 copy the lookup must miss.
    for index in 0 .. 8 {
        cache.set(&format!("k{index}"), json!(index), CacheKind::BanditState, None).await?;
    }
    assert!(cache.get("arm").await.is_none());
    Ok(())
}

#[tokio::test]
async fn corrupt_l2_entry_misses_and_audits() -> Result<(), Box<dyn std::error::Error>> {
    let mut corrupt = CacheEntry::new(
        json!({"verdict": "allow"}),
        CacheKind::Decision,
        ConstitutionalTag::deployment_default(),
        Timestamp::now(),
        60_000,
    )?;
    corrupt.value = json!({"verdict": "deny"});

    let audit = Arc::new(CapturingAudit::default());
    let cache = small_cache(
        Some(Arc::new(FixedShared {
            entry: corrupt,
        })),
        Some(Arc::clone(&audit) as Arc<dyn AuditSink>),
    );

    assert!(cache.get("poisoned").await.is_none());
    assert_eq!(cache.stats().integrity_failures, 1);

    let drafts = audit.drafts.lock().map_err(|err| err.to_string())?;
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].kind, AuditEventKind::CacheIntegrity);
    Ok(())
}

#[tokio::test]
async fn write_back_entries_reach_l2_only_on_flush() -> Result<(), Box<dyn std::error::Error>> {
    let l2: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::default());
    let cache = small_cache(Some(Arc::clone(&l2)), None);

    cache
        .set_with_strategy(
            "deferred",
            json!({"metric": 42}),
            CacheKind::Metrics,
            None,
            covenant_cache::WriteStrategy::WriteBack,
        )
        .await?;
    assert!(l2.fetch("deferred").await?.is_none());

    let flushed = cache.flush().await?;
    assert_eq!(flushed, 1);
    let entry = l2.fetch("deferred").await?.ok_or("expected flushed entry")?;
    assert_eq!(entry.value, json!({"metric": 42}));

    // The queue drained; a second flush is a no-op.
    assert_eq!(cache.flush().await?, 0);
    Ok(())
}

#[tokio::test]
async fn delete_clears_both_tiers() -> Result<(), Box<dyn std::error::Error>> {
    let l2: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::default());
    let cache = small_cache(Some(Arc::clone(&l2)), None);
    cache.set("gone", json!(1), CacheKind::Decision, None).await?;
    cache.delete("gone").await?;
    assert!(cache.get("gone").await.is_none());
    assert!(l2.fetch("gone").await?.is_none());
    Ok(())
}
