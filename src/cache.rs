//! Key/value cache provider contract and an in-memory provider.
//!
//! The contract mirrors the subset of JCache the session store relies on. Every
//! operation is atomic per key; `replace` and `remove_if` compare values with
//! `PartialEq`, so stored values must compare by content.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CacheError;

pub trait CacheKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

pub trait CacheValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Settings applied when a cache is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfiguration {
    pub store_by_value: bool,
    /// Entries never expire on their own.
    pub eternal: bool,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            store_by_value: true,
            eternal: true,
        }
    }
}

pub trait Cache<K, V>: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &K) -> Result<Option<V>, CacheError>;

    fn put(&self, key: K, value: V) -> Result<(), CacheError>;

    /// Returns `false` and leaves the entry untouched when the key is present.
    fn put_if_absent(&self, key: K, value: V) -> Result<bool, CacheError>;

    /// Compare-and-replace: stores `new` only while the entry equals `old`.
    fn replace(&self, key: &K, old: &V, new: V) -> Result<bool, CacheError>;

    fn remove(&self, key: &K) -> Result<bool, CacheError>;

    /// Removes the entry only while it equals `value`.
    fn remove_if(&self, key: &K, value: &V) -> Result<bool, CacheError>;

    fn get_and_remove(&self, key: &K) -> Result<Option<V>, CacheError>;

    fn remove_all(&self, keys: &[K]) -> Result<(), CacheError>;

    fn contains_key(&self, key: &K) -> Result<bool, CacheError>;

    /// Point-in-time copy of every entry.
    fn entries(&self) -> Result<Vec<(K, V)>, CacheError>;
}

pub trait CacheManager: Send + Sync {
    /// `Ok(None)` when no cache of that name exists.
    fn get_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn Cache<K, V>>>, CacheError>;

    /// Fails with [`CacheError::AlreadyExists`] when another caller created it first.
    fn create_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        configuration: CacheConfiguration,
    ) -> Result<Arc<dyn Cache<K, V>>, CacheError>;

    fn destroy_cache(&self, name: &str) -> Result<(), CacheError>;

    fn enable_statistics(&self, name: &str, enabled: bool) -> Result<(), CacheError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

#[derive(Debug, Default)]
struct Counters {
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
}

impl Counters {
    fn bump(&self, counter: &AtomicU64) {
        if self.enabled.load(Ordering::Relaxed) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Snapshot of a cache's counters. All zero unless statistics are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub removals: u64,
}

pub struct MemoryCache<K, V> {
    name: String,
    configuration: CacheConfiguration,
    entries: RwLock<HashMap<K, V>>,
    counters: Counters,
    closed: Arc<AtomicBool>,
}

impl<K: CacheKey, V: CacheValue> MemoryCache<K, V> {
    fn new(name: &str, configuration: CacheConfiguration, closed: Arc<AtomicBool>) -> Self {
        Self {
            name: name.to_owned(),
            configuration,
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            closed,
        }
    }

    #[must_use]
    pub fn configuration(&self) -> CacheConfiguration {
        self.configuration
    }

    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            removals: self.counters.removals.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> for MemoryCache<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.ensure_open()?;
        let value = self.entries.read().get(key).cloned();
        let counter = if value.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        self.counters.bump(counter);
        Ok(value)
    }

    fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.entries.write().insert(key, value);
        self.counters.bump(&self.counters.puts);
        Ok(())
    }

    fn put_if_absent(&self, key: K, value: V) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, value);
        self.counters.bump(&self.counters.puts);
        Ok(true)
    }

    fn replace(&self, key: &K, old: &V, new: V) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(current) if current == old => {
                *current = new;
                self.counters.bump(&self.counters.puts);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove(&self, key: &K) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.counters.bump(&self.counters.removals);
        }
        Ok(removed)
    }

    fn remove_if(&self, key: &K, value: &V) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        if entries.get(key) != Some(value) {
            return Ok(false);
        }
        entries.remove(key);
        self.counters.bump(&self.counters.removals);
        Ok(true)
    }

    fn get_and_remove(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.ensure_open()?;
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.counters.bump(&self.counters.removals);
        }
        Ok(removed)
    }

    fn remove_all(&self, keys: &[K]) -> Result<(), CacheError> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        for key in keys {
            if entries.remove(key).is_some() {
                self.counters.bump(&self.counters.removals);
            }
        }
        Ok(())
    }

    fn contains_key(&self, key: &K) -> Result<bool, CacheError> {
        self.ensure_open()?;
        Ok(self.entries.read().contains_key(key))
    }

    fn entries(&self) -> Result<Vec<(K, V)>, CacheError> {
        self.ensure_open()?;
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

type AnyCache = Arc<dyn Any + Send + Sync>;

struct Registered {
    cache: AnyCache,
    statistics: Box<dyn Fn(bool) + Send + Sync>,
}

/// Process-local provider. Caches are typed at creation and looked up by name.
#[derive(Default)]
pub struct MemoryCacheManager {
    caches: RwLock<HashMap<String, Registered>>,
    closed: Arc<AtomicBool>,
}

impl MemoryCacheManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle for inspecting configuration or statistics.
    pub fn memory_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<MemoryCache<K, V>>>, CacheError> {
        let caches = self.caches.read();
        let Some(registered) = caches.get(name) else {
            return Ok(None);
        };
        Arc::clone(&registered.cache)
            .downcast::<MemoryCache<K, V>>()
            .map(Some)
            .map_err(|_| CacheError::TypeMismatch {
                name: name.to_owned(),
            })
    }

    #[must_use]
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

impl CacheManager for MemoryCacheManager {
    fn get_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<dyn Cache<K, V>>>, CacheError> {
        self.ensure_open()?;
        Ok(self
            .memory_cache::<K, V>(name)?
            .map(|cache| cache as Arc<dyn Cache<K, V>>))
    }

    fn create_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        configuration: CacheConfiguration,
    ) -> Result<Arc<dyn Cache<K, V>>, CacheError> {
        self.ensure_open()?;
        let mut caches = self.caches.write();
        if caches.contains_key(name) {
            return Err(CacheError::AlreadyExists {
                name: name.to_owned(),
            });
        }
        let cache = Arc::new(MemoryCache::<K, V>::new(
            name,
            configuration,
            Arc::clone(&self.closed),
        ));
        let for_statistics = Arc::clone(&cache);
        caches.insert(
            name.to_owned(),
            Registered {
                cache: Arc::clone(&cache) as AnyCache,
                statistics: Box::new(move |enabled| {
                    for_statistics
                        .counters
                        .enabled
                        .store(enabled, Ordering::Relaxed);
                }),
            },
        );
        Ok(cache)
    }

    fn destroy_cache(&self, name: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.caches.write().remove(name);
        Ok(())
    }

    fn enable_statistics(&self, name: &str, enabled: bool) -> Result<(), CacheError> {
        self.ensure_open()?;
        if let Some(registered) = self.caches.read().get(name) {
            (registered.statistics)(enabled);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.caches.write().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
