//! Short-lived cache of the availability snapshot
//!
//! The cache is advisory: every failure is logged and the caller falls back
//! to the store. Allocation and checkout drop the cached entry.
//!
//! Each invalidation bumps a generation counter, and a snapshot read before
//! an invalidation this process has seen is not written back. An older
//! snapshot can still land when the invalidation races the write itself or
//! comes from another service instance; it lives at most `ttl_seconds`.

use common::cache::RedisPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::models::LevelAvailability;

const AVAILABILITY_KEY: &str = "parking:availability";

#[derive(Clone)]
pub struct AvailabilityCache {
    pool: RedisPool,
    ttl_seconds: u64,
    generation: Arc<AtomicU64>,
}

impl AvailabilityCache {
    pub fn new(pool: RedisPool, ttl_seconds: u64) -> Self {
        Self {
            pool,
            ttl_seconds,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take before reading the store; pass to [`AvailabilityCache::put`]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn get(&self) -> Option<Vec<LevelAvailability>> {
        let raw = match self.pool.get(AVAILABILITY_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Availability cache read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(levels) => {
                debug!("Serving availability from cache");
                Some(levels)
            }
            Err(e) => {
                warn!("Discarding unreadable availability cache entry: {}", e);
                self.invalidate().await;
                None
            }
        }
    }

    /// Store a snapshot read at generation `read_at`. Returns whether a
    /// write was attempted; stale snapshots are dropped.
    pub async fn put(&self, read_at: u64, levels: &[LevelAvailability]) -> bool {
        if self.ttl_seconds == 0 {
            return false;
        }
        if self.generation() != read_at {
            debug!("Availability changed while reading, not caching snapshot");
            return false;
        }

        let raw = match serde_json::to_string(levels) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode availability snapshot: {}", e);
                return false;
            }
        };

        if let Err(e) = self
            .pool
            .set(AVAILABILITY_KEY, &raw, Some(self.ttl_seconds))
            .await
        {
            warn!("Availability cache write failed: {}", e);
        }
        true
    }

    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.pool.delete(AVAILABILITY_KEY).await {
            warn!("Availability cache invalidation failed: {}", e);
        }
    }
}
