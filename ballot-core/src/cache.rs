//! Read-through cache for candidate listings
//!
//! `getCandidatesById` is the hottest read of a running election and walks
//! every candidate record. The service keeps its JSON payload per election
//! for a fixed time-to-live. Entries are also dropped whenever a write may
//! change the listing (candidate registration, vote, reconciliation), and a
//! background task purges expired entries once per time-to-live.
//!
//! The cache lives in the service, never in the state machine: replicas
//! must compute identical results whether or not their cache is warm.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Served from cache
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Fell through to the ledger
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hit rate in percent
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            (hits as f64) / (total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone)]
struct CachedListing {
    payload: Vec<u8>,
    stored_at: Instant,
}

/// Per-election candidate listing cache
#[derive(Debug)]
pub struct CandidateCache {
    entries: DashMap<String, CachedListing>,
    ttl: Duration,
    stats: CacheStats,
}

impl CandidateCache {
    /// Cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    /// Cached payload for `election_key`, if still fresh
    pub fn get(&self, election_key: &str) -> Option<Vec<u8>> {
        let fresh = self
            .entries
            .get(election_key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.payload.clone());

        match fresh {
            Some(payload) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(payload)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                // Drop a stale entry if one was there
                self.entries
                    .remove_if(election_key, |_, entry| entry.stored_at.elapsed() >= self.ttl);
                None
            }
        }
    }

    /// Store a payload
    pub fn insert(&self, election_key: impl Into<String>, payload: Vec<u8>) {
        self.entries.insert(
            election_key.into(),
            CachedListing {
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop the entry of one election
    pub fn invalidate(&self, election_key: &str) {
        if self.entries.remove(election_key).is_some() {
            tracing::debug!(election = %election_key, "Candidate cache invalidated");
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - self.entries.len()
    }

    /// Time-to-live of every entry
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of cached elections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Spawn a task purging expired entries once per time-to-live.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_cache_purger(cache: Arc<CandidateCache>) -> JoinHandle<()> {
    let period = cache.ttl().max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "Candidate cache purged");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let cache = CandidateCache::new(Duration::from_secs(60));
        assert!(cache.get("election.1").is_none());

        cache.insert("election.1", b"[]".to_vec());
        assert_eq!(cache.get("election.1"), Some(b"[]".to_vec()));

        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hit_rate(), 50.0);
    }

    #[test]
    fn test_entries_expire() {
        let cache = CandidateCache::new(Duration::from_millis(10));
        cache.insert("election.1", b"[]".to_vec());
        std::thread::sleep(Duration::from_millis(25));

        assert!(cache.get("election.1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = CandidateCache::new(Duration::from_millis(10));
        cache.insert("election.1", b"[]".to_vec());
        cache.insert("election.2", b"[]".to_vec());
        std::thread::sleep(Duration::from_millis(25));

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_invalidate() {
        let cache = CandidateCache::new(Duration::from_secs(60));
        cache.insert("election.1", b"[]".to_vec());
        cache.insert("election.2", b"[]".to_vec());

        cache.invalidate("election.1");
        assert!(cache.get("election.1").is_none());
        assert!(cache.get("election.2").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purger_drops_entries_nobody_reads() {
        let cache = Arc::new(CandidateCache::new(Duration::from_millis(20)));
        cache.insert("election.1", b"[]".to_vec());
        cache.insert("election.2", b"[]".to_vec());

        let purger = spawn_cache_purger(cache.clone());
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.is_empty());
        // Never looked up, so no miss was counted
        assert_eq!(cache.stats().misses(), 0);

        purger.abort();
        assert!(purger.await.unwrap_err().is_cancelled());
    }
}
