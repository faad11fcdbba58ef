//! Session stores over a [`CacheManager`].
//!
//! Two layouts implement [`BackedSessionMap`]: [`MultiRowStore`] keeps one
//! metadata record per session and one cache entry per attribute, while
//! [`SingleRowStore`] keeps metadata and the whole attribute map in one record.
//! Neither store locks: every read-modify-write is a compare-and-replace loop on
//! the provider's per-key atomic `replace`.

mod backoff;
pub mod multi_row;
pub mod serializer;
pub mod single_row;

use std::collections::HashMap;
use std::sync::Arc;

use attribute_codec::AttributeValue;
use parking_lot::Mutex;
use session_store::{SessionData, SessionInfo, INVAL_KEY};
use time::OffsetDateTime;

use crate::cache::{Cache, CacheConfiguration, CacheKey, CacheManager, CacheValue};
use crate::config::{CacheStoreConfig, SessionManagerConfig};
use crate::error::{CacheStoreError, Result};
use crate::logging::{cache_invoke, cache_return};
use crate::session::{BackedSession, HTTP_SESSION_BINDING_LISTENER};

pub use multi_row::MultiRowStore;
pub use single_row::SingleRowStore;

/// Result of one invalidation pass.
#[derive(Debug, Default)]
pub struct InvalidationOutcome {
    /// Ids of expired sessions without binding listeners, already removed.
    pub expired: Vec<String>,
    /// Expired sessions with binding listeners, already removed, attributes loaded,
    /// handed back so the caller can fire unbinding.
    pub listener_sessions: Vec<BackedSession>,
}

/// Persistence operations the session manager drives.
pub trait BackedSessionMap: Send + Sync {
    fn store_id(&self) -> &str;

    /// Writes the metadata of a new session. An existing record is a
    /// [`CacheStoreError::DuplicateSession`].
    fn insert_session(&self, session: &mut BackedSession) -> Result<()>;

    fn is_present(&self, id: &str) -> Result<bool>;

    fn read_from_external(&self, id: &str) -> Result<Option<BackedSession>>;

    /// `None` when the session data is already populated, the attribute is absent,
    /// or the session was removed meanwhile.
    fn load_one_value(&self, name: &str, session: &BackedSession)
        -> Result<Option<AttributeValue>>;

    /// Every persisted attribute except those with pending local changes or removals.
    fn get_all_values(&self, session: &BackedSession) -> Result<HashMap<String, AttributeValue>>;

    /// Returns `false` when the session no longer exists in the cache.
    fn persist_session(&self, session: &mut BackedSession, prop_hit: bool) -> Result<bool>;

    /// Returns 1 when the record was updated, 0 when it is gone or already at `now`.
    fn update_last_access_time(&self, session: &mut BackedSession, now: i64) -> Result<u32>;

    /// Updates last access only while the record still carries the session's
    /// current access time.
    fn over_qualified_last_access_time_update(
        &self,
        session: &mut BackedSession,
        now: i64,
    ) -> Result<u32>;

    fn remove_persisted_session(&self, id: &str) -> Result<()>;

    /// Remote invalidation: expires the session at the next invalidation pass.
    fn set_max_inactive_to_zero(&self, id: &str) -> Result<u32>;

    /// Queues a last-access time for the next invalidation pass.
    fn cache_last_access_time(&self, id: &str, time: i64);

    fn perform_invalidation(&self, now: i64) -> Result<InvalidationOutcome>;
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn current_time_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Metadata view shared by both record layouts.
pub(crate) trait SessionRecord: CacheValue + std::fmt::Debug {
    /// The invalidation coordination record written under [`INVAL_KEY`].
    fn coordination(now: i64) -> Self;

    fn creation(&self) -> i64;
    fn last_access_time(&self) -> i64;
    fn set_last_access_time(&mut self, time: i64);
    fn max_inactive(&self) -> i32;
    fn set_max_inactive(&mut self, seconds: i32);
    fn listeners(&self) -> i16;
    fn set_listeners(&mut self, listeners: i16);
    fn user_name(&self) -> Option<&str>;
    fn set_user_name(&mut self, user: Option<String>);

    fn is_expired(&self, now: i64) -> bool {
        let max_inactive = self.max_inactive();
        max_inactive >= 0 && i64::from(max_inactive) < (now - self.last_access_time()) / 1000
    }

    fn has_binding_listener(&self) -> bool {
        self.listeners() & HTTP_SESSION_BINDING_LISTENER != 0
    }

    fn restore(&self, id: &str) -> BackedSession {
        BackedSession::restored(
            id,
            self.creation(),
            self.last_access_time(),
            self.max_inactive(),
            self.listeners(),
            self.user_name().map(str::to_owned),
        )
    }
}

impl SessionRecord for SessionInfo {
    fn coordination(now: i64) -> Self {
        Self::new(now, -1, 0, None)
    }

    fn creation(&self) -> i64 {
        self.creation_time()
    }

    fn last_access_time(&self) -> i64 {
        self.last_access()
    }

    fn set_last_access_time(&mut self, time: i64) {
        self.set_last_access(time);
    }

    fn max_inactive(&self) -> i32 {
        self.max_inactive_time()
    }

    fn set_max_inactive(&mut self, seconds: i32) {
        self.set_max_inactive_time(seconds);
    }

    fn listeners(&self) -> i16 {
        self.listener_types()
    }

    fn set_listeners(&mut self, listeners: i16) {
        self.set_listener_types(listeners);
    }

    fn user_name(&self) -> Option<&str> {
        self.user()
    }

    fn set_user_name(&mut self, user: Option<String>) {
        self.set_user(user);
    }
}

impl SessionRecord for SessionData {
    fn coordination(now: i64) -> Self {
        Self::new(now, -1, 0, None)
    }

    fn creation(&self) -> i64 {
        self.creation_time()
    }

    fn last_access_time(&self) -> i64 {
        self.last_access()
    }

    fn set_last_access_time(&mut self, time: i64) {
        self.set_last_access(time);
    }

    fn max_inactive(&self) -> i32 {
        self.max_inactive_time()
    }

    fn set_max_inactive(&mut self, seconds: i32) {
        self.set_max_inactive_time(seconds);
    }

    fn listeners(&self) -> i16 {
        self.listener_count()
    }

    fn set_listeners(&mut self, listeners: i16) {
        self.set_listener_count(listeners);
    }

    fn user_name(&self) -> Option<&str> {
        self.user()
    }

    fn set_user_name(&mut self, user: Option<String>) {
        self.set_user(user);
    }
}

/// Record cache of one store plus the configuration both layouts share.
pub(crate) struct RecordCache<R> {
    pub(crate) name: String,
    pub(crate) cache: Arc<dyn Cache<String, R>>,
    pub(crate) config: SessionManagerConfig,
    cached_last_access: Mutex<HashMap<String, i64>>,
}

impl<R: SessionRecord> RecordCache<R> {
    pub(crate) fn new(
        name: String,
        cache: Arc<dyn Cache<String, R>>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            name,
            cache,
            config,
            cached_last_access: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<R>> {
        cache_invoke!(self.name, "get", key);
        let value = self.cache.get(&key.to_owned())?;
        cache_return!(self.name, "get", value = ?value);
        Ok(value)
    }

    pub(crate) fn replace(&self, key: &str, old: &R, new: R) -> Result<bool> {
        cache_invoke!(self.name, "replace", key, old = ?old, new = ?new);
        let replaced = self.cache.replace(&key.to_owned(), old, new)?;
        cache_return!(self.name, "replace", replaced);
        Ok(replaced)
    }

    pub(crate) fn remove_if(&self, key: &str, value: &R) -> Result<bool> {
        cache_invoke!(self.name, "remove", key, value = ?value);
        let removed = self.cache.remove_if(&key.to_owned(), value)?;
        cache_return!(self.name, "remove", removed);
        Ok(removed)
    }

    pub(crate) fn contains_key(&self, key: &str) -> Result<bool> {
        cache_invoke!(self.name, "containsKey", key);
        let contains = self.cache.contains_key(&key.to_owned())?;
        cache_return!(self.name, "containsKey", contains);
        Ok(contains)
    }

    pub(crate) fn put_if_absent(&self, key: &str, record: R) -> Result<bool> {
        cache_invoke!(self.name, "putIfAbsent", key, record = ?record);
        let added = self.cache.put_if_absent(key.to_owned(), record)?;
        cache_return!(self.name, "putIfAbsent", added);
        Ok(added)
    }

    pub(crate) fn get_and_remove(&self, key: &str) -> Result<Option<R>> {
        cache_invoke!(self.name, "getAndRemove", key);
        let removed = self.cache.get_and_remove(&key.to_owned())?;
        cache_return!(self.name, "getAndRemove", removed = ?removed);
        Ok(removed)
    }

    /// Snapshot of every session record, skipping the coordination entry.
    pub(crate) fn sessions(&self) -> Result<Vec<(String, R)>> {
        cache_invoke!(self.name, "iterator");
        let entries = self.cache.entries()?;
        cache_return!(self.name, "iterator", count = entries.len());
        Ok(entries
            .into_iter()
            .filter(|(key, _)| key != INVAL_KEY)
            .collect())
    }

    /// Compare-and-replace loop. `update` returns `None` to stop without writing;
    /// the loop result is `None` when the record is missing.
    pub(crate) fn update_with<T>(
        &self,
        key: &str,
        mut update: impl FnMut(&R) -> Option<(R, T)>,
    ) -> Result<Option<T>> {
        loop {
            let Some(old) = self.get(key)? else {
                return Ok(None);
            };
            let Some((new, outcome)) = update(&old) else {
                return Ok(None);
            };
            if self.replace(key, &old, new)? {
                return Ok(Some(outcome));
            }
        }
    }

    pub(crate) fn update_last_access_time(&self, key: &str, now: i64) -> Result<u32> {
        let updated = self.update_with(key, |record| {
            if record.last_access_time() == now {
                return None;
            }
            let mut record = record.clone();
            record.set_last_access_time(now);
            Some((record, ()))
        })?;
        Ok(u32::from(updated.is_some()))
    }

    /// Single attempt, matching an update that qualifies on the current access time.
    pub(crate) fn over_qualified_update(
        &self,
        key: &str,
        session: &mut BackedSession,
        now: i64,
    ) -> Result<u32> {
        let Some(old) = self.get(key)? else {
            return Ok(0);
        };
        let current = session.current_access_time();
        if old.last_access_time() != current {
            tracing::debug!(session = session.id(), current, "session current access time");
            return Ok(0);
        }
        // A later time already in the cache still counts as a matched row.
        if old.last_access_time() >= now {
            return Ok(1);
        }
        let mut record = old.clone();
        record.set_last_access_time(now);
        if self.replace(key, &old, record)? {
            session.update_last_access_time(now);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    pub(crate) fn set_max_inactive_to_zero(&self, key: &str) -> Result<u32> {
        let updated = self.update_with(key, |record| {
            if record.max_inactive() == 0 {
                return None;
            }
            let mut record = record.clone();
            record.set_max_inactive(0);
            Some((record, ()))
        })?;
        Ok(u32::from(updated.is_some()))
    }

    /// Applies pending metadata hits and the access time to the record.
    /// `extra` runs on every attempt. Returns `false` when the record is gone.
    /// The session's hit flags are cleared only once the record is replaced.
    pub(crate) fn persist_metadata(
        &self,
        key: &str,
        session: &mut BackedSession,
        mut extra: impl FnMut(&mut R) -> Result<()>,
    ) -> Result<bool> {
        let write_access_time = !self.config.enable_eos_write || self.config.scheduled_invalidation;
        let user_hit = session.user_write_hit();
        let max_inactive_hit = session.max_inact_write_hit();
        let listener_hit = session.listen_cnt_hit();
        let time = session.current_access_time();

        loop {
            let Some(old) = self.get(key)? else {
                return Ok(false);
            };
            let mut record = old.clone();
            if user_hit {
                record.set_user_name(session.user_name().map(str::to_owned));
            }
            if max_inactive_hit {
                record.set_max_inactive(session.max_inactive_interval());
            }
            if listener_hit {
                record.set_listeners(session.listener_flag());
            }
            if write_access_time {
                record.set_last_access_time(time);
            }
            extra(&mut record)?;
            tracing::debug!(session = session.id(), record = ?record, "persisting metadata");
            if self.replace(key, &old, record)? {
                if write_access_time {
                    session.set_last_write_last_access_time(time);
                }
                session.clear_write_hits();
                return Ok(true);
            }
        }
    }

    /// Whether a persist call has nothing to write.
    pub(crate) fn nothing_to_persist(&self, session: &BackedSession, prop_hit: bool) -> bool {
        !session.has_metadata_hit()
            && self.config.enable_eos_write
            && !self.config.scheduled_invalidation
            && !prop_hit
    }

    pub(crate) fn cache_last_access_time(&self, id: &str, time: i64) {
        self.cached_last_access.lock().insert(id.to_owned(), time);
    }

    /// Flushes queued last-access times, never moving a record backwards.
    pub(crate) fn write_cached_last_access_times(
        &self,
        key_for: impl Fn(&str) -> String,
    ) -> Result<()> {
        let pending = std::mem::take(&mut *self.cached_last_access.lock());
        for (id, time) in pending {
            self.update_with(&key_for(&id), |record| {
                if record.last_access_time() >= time {
                    return None;
                }
                let mut record = record.clone();
                record.set_last_access_time(time);
                Some((record, ()))
            })?;
        }
        Ok(())
    }

    /// Claims this check interval's scan through the [`INVAL_KEY`] record.
    ///
    /// Only the caller whose compare-and-replace moves the record's time forward
    /// scans; everyone else within the interval backs off.
    pub(crate) fn claim_invalidation(&self, now: i64) -> Result<bool> {
        let Some(old) = self.get(INVAL_KEY)? else {
            // First pass for this store.
            let record = R::coordination(now);
            cache_invoke!(self.name, "put", key = INVAL_KEY, record = ?record);
            self.cache.put(INVAL_KEY.to_owned(), record)?;
            cache_return!(self.name, "put");
            return Ok(true);
        };

        let last_time = old.last_access_time();
        let last_check = now - self.config.invalidation_check_interval_secs * 1000;
        tracing::debug!(last_check, last_time, now, "invalidation coordination");
        if last_check >= last_time || last_time > now {
            let mut record = old.clone();
            record.set_last_access_time(now);
            return self.replace(INVAL_KEY, &old, record);
        }
        Ok(false)
    }

    /// Whether a scan started at `start` has used up its check interval.
    pub(crate) fn scan_overran(&self, start: i64) -> bool {
        start + self.config.invalidation_check_interval_secs * 1000 <= current_time_millis()
    }
}

/// Gets a cache by name, creating it when absent. Losing a creation race to
/// another member falls back to the winner's cache.
pub(crate) fn open_cache<M, K, V>(
    manager: &M,
    name: &str,
    store_config: &CacheStoreConfig,
) -> Result<Arc<dyn Cache<K, V>>>
where
    M: CacheManager,
    K: CacheKey,
    V: CacheValue,
{
    cache_invoke!(manager_label(), "getCache", name);
    if let Some(cache) = manager.get_cache::<K, V>(name)? {
        cache_return!(manager_label(), "getCache", found = true);
        configure_monitoring(manager, store_config, name)?;
        return Ok(cache);
    }
    cache_return!(manager_label(), "getCache", found = false);

    let configuration = CacheConfiguration {
        store_by_value: !store_config.supports_store_by_reference,
        eternal: true,
    };
    cache_invoke!(manager_label(), "createCache", name, configuration = ?configuration);
    let cache = match manager.create_cache::<K, V>(name, configuration) {
        Ok(cache) => cache,
        Err(error) => {
            cache_return!(manager_label(), "createCache", %error);
            manager
                .get_cache::<K, V>(name)?
                .ok_or_else(|| CacheStoreError::cache_init(name, error))?
        }
    };
    cache_return!(manager_label(), "createCache", cache = cache.name());
    configure_monitoring(manager, store_config, name)?;
    Ok(cache)
}

pub(crate) fn configure_monitoring<M: CacheManager>(
    manager: &M,
    store_config: &CacheStoreConfig,
    name: &str,
) -> Result<()> {
    if store_config.enable_monitoring {
        manager.enable_statistics(name, true)?;
        tracing::debug!(cache = name, "statistics enabled");
    }
    Ok(())
}

fn manager_label() -> &'static str {
    "CacheManager"
}

/// Logs a failed store operation at error level before handing it back.
pub(crate) fn logged<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(error) = &result {
        tracing::error!(operation, %error, "session store operation failed");
    }
    result
}
