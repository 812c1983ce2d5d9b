//! Bounded response caching

use std::hash::Hash;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

struct CacheInner<K, V> {
    entries: AHashMap<K, V>,
    /// Least recently used first
    access_order: Vec<K>,
}

/// LRU cache shared between clones
pub struct DataCache<K, V> {
    inner: Arc<RwLock<CacheInner<K, V>>>,
    /// Maximum number of entries to keep
    max_entries: usize,
}

impl<K, V> DataCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: AHashMap::new(),
                access_order: Vec::new(),
            })),
            max_entries: max_entries.max(1),
        }
    }

    /// Get an entry and mark it as recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();
        let value = inner.entries.get(key).cloned()?;
        touch(&mut inner.access_order, key);
        Some(value)
    }

    /// Put an entry, evicting the least recently used one when full
    pub fn put(&self, key: K, value: V) {
        let mut inner = self.inner.write();

        if inner.entries.len() >= self.max_entries
            && !inner.entries.contains_key(&key)
            && !inner.access_order.is_empty()
        {
            let oldest = inner.access_order.remove(0);
            inner.entries.remove(&oldest);
        }

        inner.entries.insert(key.clone(), value);
        touch(&mut inner.access_order, &key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.access_order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

fn touch<K: Eq + Clone>(order: &mut Vec<K>, key: &K) {
    order.retain(|k| k != key);
    order.push(key.clone());
}

impl<K, V> Clone for DataCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            max_entries: self.max_entries,
        }
    }
}

impl<K, V> std::fmt::Debug for DataCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("len", &self.inner.read().entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = DataCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"a"), Some(1));

        cache.put("c", 3);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
