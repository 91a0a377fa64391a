//! Short-lived result cache with stale reads.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct CacheEntry {
    stored_at: Instant,
    value: Arc<dyn Any + Send + Sync>,
}

/// TTL-keyed result cache shared across failover invocations.
///
/// One coordinator serves calls of many result types, so entries are stored
/// type-erased; a typed read against a key holding a different type is a
/// miss. Entries are replaced whole, so a stale read racing a fresh write
/// sees either the old or the new value, never a mix.
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn store<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                stored_at: Instant::now(),
                value: Arc::new(value),
            },
        );
    }

    /// Typed read. The bool is `true` when the entry is older than `ttl`.
    pub fn get<T: Clone + Send + Sync + 'static>(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Option<(T, bool)> {
        let entry = self.entries.get(key)?;
        let value = entry.value.downcast_ref::<T>()?.clone();
        let stale = entry.stored_at.elapsed() >= ttl;
        Some((value, stale))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&self) {
        self.entries.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_then_stale() {
        let cache = ResultCache::new();
        cache.store("quote", 42u64);

        let (value, stale) = cache.get::<u64>("quote", Duration::from_secs(60)).unwrap();
        assert_eq!(value, 42);
        assert!(!stale);

        // Zero TTL: anything stored is already stale.
        let (value, stale) = cache.get::<u64>("quote", Duration::from_millis(0)).unwrap();
        assert_eq!(value, 42);
        assert!(stale);
    }

    #[test]
    fn test_type_mismatch_is_miss() {
        let cache = ResultCache::new();
        cache.store("quote", 42u64);
        assert!(cache.get::<String>("quote", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_overwrite_replaces_whole_entry() {
        let cache = ResultCache::new();
        cache.store("quote", "old".to_string());
        cache.store("quote", "new".to_string());
        let (value, _) = cache.get::<String>("quote", Duration::from_secs(60)).unwrap();
        assert_eq!(value, "new");
        assert_eq!(cache.len(), 1);
    }
}
