//! Bounded get-or-add cache with insertion-order eviction.
//!
//! [`SourceCache`] keeps parsed source documents alive between lookups so that a
//! manifest with thousands of rows pointing into the same handful of files parses
//! each file once. It is also used, unbounded, as the converter's mapper registry.
//!
//! Eviction is strict first-in-first-out by insertion order: reading an entry does
//! not refresh it.
//!
//! # Examples
//!
//! ```
//! use ds_import::source_cache::SourceCache;
//!
//! let mut cache: SourceCache<&str, usize> = SourceCache::new(2);
//! let value = *cache.get_or_add("a", || Ok::<_, ()>(1)).unwrap();
//! assert_eq!(value, 1);
//! cache.get_or_add("b", || Ok::<_, ()>(2)).unwrap();
//! cache.get_or_add("c", || Ok::<_, ()>(3)).unwrap();
//! assert!(!cache.contains(&"a"));
//! assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["b", "c"]);
//! ```

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use tracing::{debug, trace};

/// Default number of parsed documents kept by a source cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Key/value cache that evicts its earliest-inserted entry when full.
///
/// Values are produced by a caller-supplied loader on first access and returned
/// from the cache afterwards. A loader failure stores nothing.
pub struct SourceCache<K, V> {
    entries: IndexMap<K, V>,
    max_size: Option<usize>,
}

impl<K, V> SourceCache<K, V>
where
    K: Hash + Eq + fmt::Debug,
{
    /// Create a cache holding at most `max_size` entries.
    ///
    /// A capacity of zero is raised to one so that the value just loaded is
    /// always retrievable.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        SourceCache {
            entries: IndexMap::new(),
            max_size: Some(max_size.max(1)),
        }
    }

    /// Create a cache that never evicts.
    #[must_use]
    pub fn unbounded() -> Self {
        SourceCache {
            entries: IndexMap::new(),
            max_size: None,
        }
    }

    /// Return the value for `key`, invoking `loader` only if the key is absent.
    ///
    /// When the cache is full, the earliest-inserted key is evicted before the
    /// new value is stored.
    ///
    /// # Errors
    ///
    /// Returns the loader's error unchanged; the cache is not modified.
    pub fn get_or_add<E, F>(&mut self, key: K, loader: F) -> Result<&mut V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(index) = self.entries.get_index_of(&key) {
            trace!(?key, "source cache hit");
            return Ok(&mut self.entries[index]);
        }

        debug!(?key, "source cache miss");
        let value = loader()?;

        if let Some(max_size) = self.max_size {
            while self.entries.len() >= max_size {
                if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                    debug!(key = ?evicted, "source cache eviction");
                }
            }
        }

        let (index, _) = self.entries.insert_full(key, value);
        Ok(&mut self.entries[index])
    }

    /// Look up a key without loading it.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Whether `key` is currently cached.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries, or `None` for an unbounded cache.
    #[must_use]
    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Cached keys, earliest-inserted first.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Cached values, earliest-inserted first.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> Default for SourceCache<K, V>
where
    K: Hash + Eq + fmt::Debug,
{
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<K: fmt::Debug, V> fmt::Debug for SourceCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCache")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .field("max_size", &self.max_size)
            .finish()
    }
}
