//! Dereference caches
//!
//! [`Cache`] is the capability the dereferencer reads through. Two
//! implementations ship here:
//! - [`MemoryCache`]: expiry checked at read time against an injected clock
//! - [`MokaCache`]: capacity-bounded, per-entry TTL, for production use

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache as MokaStore;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::error::AppError;
use crate::metrics::CACHE_SIZE;

/// TTL applied to dereferenced nodes (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

const CACHE_NAME: &str = "dereference";

/// Derive a cache key from an IRI
///
/// `{ } ( ) / \ @ :` become `_`. Distinct IRIs that differ only in those
/// characters share a key.
pub fn normalize_cache_key(iri: &str) -> String {
    iri.chars()
        .map(|c| match c {
            '{' | '}' | '(' | ')' | '/' | '\\' | '@' | ':' => '_',
            other => other,
        })
        .collect()
}

/// Key/value cache for decoded graph nodes
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Live value for `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;

    /// Store `value` under `key` for `ttl`
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError>;

    /// Whether a live value exists for `key`
    async fn has(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.get(key).await?.is_some())
    }
}

// =============================================================================
// Memory Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CachedNode {
    node: Value,
    cached_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl CachedNode {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now - self.cached_at < self.ttl
    }
}

/// In-memory cache with clock-driven expiry
///
/// Expired entries are skipped on read and stay resident until
/// [`MemoryCache::prune_expired`] runs.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedNode>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
        tracing::debug!(key = %key, "Invalidated cache entry");
    }

    /// Clear all entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        CACHE_SIZE.with_label_values(&[CACHE_NAME]).set(0);
    }

    /// Drop expired entries
    pub async fn prune_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| v.is_valid(now));
        let removed = before - entries.len();

        CACHE_SIZE
            .with_label_values(&[CACHE_NAME])
            .set(entries.len() as i64);
        if removed > 0 {
            tracing::info!("Pruned {} expired cache entries", removed);
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let total = entries.len();
        let valid = entries.values().filter(|v| v.is_valid(now)).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|cached| cached.is_valid(now))
            .map(|cached| cached.node.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::Validation(format!("Invalid cache TTL: {}", e)))?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CachedNode {
                node: value,
                cached_at: self.clock.now(),
                ttl,
            },
        );

        CACHE_SIZE
            .with_label_values(&[CACHE_NAME])
            .set(entries.len() as i64);
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
}

// =============================================================================
// Moka Cache
// =============================================================================

#[derive(Clone)]
struct MokaEntry {
    node: Arc<Value>,
    ttl: Duration,
}

struct EntryExpiry;

impl moka::Expiry<String, MokaEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MokaEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MokaEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Capacity-bounded cache backed by [`moka::future::Cache`]
///
/// Expiry follows the wall clock, not an injected [`Clock`].
pub struct MokaCache {
    nodes: MokaStore<String, MokaEntry>,
}

impl MokaCache {
    /// Create new cache holding at most `max_capacity` nodes
    pub fn new(max_capacity: u64) -> Self {
        let nodes = MokaStore::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { nodes }
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self
            .nodes
            .get(key)
            .await
            .map(|entry| entry.node.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError> {
        self.nodes
            .insert(
                key.to_string(),
                MokaEntry {
                    node: Arc::new(value),
                    ttl,
                },
            )
            .await;

        CACHE_SIZE
            .with_label_values(&[CACHE_NAME])
            .set(self.nodes.entry_count() as i64);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.nodes.contains_key(key))
    }
}
