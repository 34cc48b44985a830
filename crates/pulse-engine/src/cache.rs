//! TTL cache for market data

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::model::{BarSeries, QuoteSnapshot};

/// Source of "now" for expiry decisions
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start the clock at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

/// What a cache entry holds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Current quote
    Quote,
    /// Daily bars with a lookback
    History { lookback_days: usize },
}

/// Cache key: instrument code plus data kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Instrument code
    pub code: String,
    /// Data kind
    pub kind: DataKind,
}

impl CacheKey {
    /// Key for a quote
    pub fn quote(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: DataKind::Quote,
        }
    }

    /// Key for a history request
    pub fn history(code: impl Into<String>, lookback_days: usize) -> Self {
        Self {
            code: code.into(),
            kind: DataKind::History { lookback_days },
        }
    }
}

/// Cached payload
#[derive(Debug, Clone, PartialEq)]
pub enum CachedData {
    Quote(QuoteSnapshot),
    History(BarSeries),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: CachedData,
    fetched_at: DateTime<Utc>,
}

/// Thread-safe TTL cache for quotes and histories
///
/// An entry is served only while `now - fetched_at < ttl`. Stale entries are
/// never returned and get overwritten by the next successful fetch.
pub struct MarketCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MarketCache {
    /// Create a cache with the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with a custom clock
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(entry.fetched_at) < ttl
    }

    /// Fresh value for `key`, if any
    pub async fn get(&self, key: &CacheKey) -> Option<CachedData> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if self.is_fresh(entry, now) {
            tracing::debug!(code = %key.code, kind = ?key.kind, "cache hit");
            Some(entry.data.clone())
        } else {
            tracing::debug!(code = %key.code, kind = ?key.kind, "cache entry expired");
            None
        }
    }

    /// Fresh quote for `code`
    pub async fn get_quote(&self, code: &str) -> Option<QuoteSnapshot> {
        match self.get(&CacheKey::quote(code)).await? {
            CachedData::Quote(quote) => Some(quote),
            CachedData::History(_) => None,
        }
    }

    /// Fresh history for `code` with exactly this lookback
    pub async fn get_history(&self, code: &str, lookback_days: usize) -> Option<BarSeries> {
        match self.get(&CacheKey::history(code, lookback_days)).await? {
            CachedData::History(series) => Some(series),
            CachedData::Quote(_) => None,
        }
    }

    /// Store a value stamped with the current clock time
    pub async fn insert(&self, key: CacheKey, data: CachedData) {
        let fetched_at = self.clock.now();
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { data, fetched_at });
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        before - entries.len()
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Clone for MarketCache {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
            clock: Arc::clone(&self.clock),
        }
    }
}
