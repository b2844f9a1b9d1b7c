//! In-process cache mapping tracking tokens to notifications.
//!
//! Tracking hits arrive without tenant context, so the cached entry carries
//! the owning tenant alongside the notification id.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEntry {
    pub notification_id: Uuid,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    entry: TokenEntry,
    expires_at: DateTime<Utc>,
}

/// Bounded LRU with a per-entry time to live.
#[derive(Clone)]
pub struct TrackingTokenCache {
    entries: Arc<RwLock<LruCache<String, CachedEntry>>>,
    ttl: Duration,
}

impl TrackingTokenCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub fn with_ttl_days(days: u32) -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::days(i64::from(days)))
    }

    pub async fn put(&self, token: &str, entry: TokenEntry) {
        self.put_at(token, entry, Utc::now()).await;
    }

    pub async fn put_at(&self, token: &str, entry: TokenEntry, now: DateTime<Utc>) {
        let mut cache = self.entries.write().await;
        cache.put(
            token.to_string(),
            CachedEntry {
                entry,
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn get(&self, token: &str) -> Option<TokenEntry> {
        self.get_at(token, Utc::now()).await
    }

    /// Expired entries are evicted on read.
    pub async fn get_at(&self, token: &str, now: DateTime<Utc>) -> Option<TokenEntry> {
        let mut cache = self.entries.write().await;
        match cache.get(token) {
            Some(cached) if cached.expires_at > now => Some(cached.entry),
            Some(_) => {
                cache.pop(token);
                None
            }
            None => None,
        }
    }
}
