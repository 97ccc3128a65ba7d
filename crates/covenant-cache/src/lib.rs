// crates/covenant-cache/src/lib.rs
// ============================================================================
// Module: Covenant Decision Cache
// Description: Two-tier, integrity-checked cache for decisions and proofs.
// Purpose: Serve recomputable governance results fast without ever lying.
// Dependencies: covenant-core, lru, lz4_flex, serde_json, tokio
// ============================================================================

//! ## Overview
//! The decision cache is a view over recomputable truth, never an authority.
//! L1 is a sharded in-process LRU with per-entry TTL; L2 is a shared
//! key-value abstraction with optional LZ4 compression. Every stored value
//! carries an integrity digest over the payload and the constitutional tag;
//! a digest mismatch on read evicts the entry, emits an audit event, and
//! reports a miss rather than a stale hit.

pub mod cache;
pub mod entry;
pub mod shared;

pub use cache::CacheStats;
pub use cache::DecisionCache;
pub use cache::DecisionCacheConfig;
pub use entry::CacheEntry;
pub use entry::CacheKind;
pub use entry::WriteStrategy;
pub use shared::MemorySharedCache;
pub use shared::SharedCache;
pub use shared::SharedCacheError;
