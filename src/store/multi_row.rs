//! One metadata record per session plus one cache entry per attribute.
//!
//! The metadata record tracks which attribute names are persisted, so reading
//! every attribute or removing a session never scans the attribute cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use attribute_codec::AttributeValue;
use session_store::{
    attribute_cache_name, meta_cache_name, MultiRowKey, SessionInfo, SessionStoreError,
};

use super::backoff::Backoff;
use super::{
    current_time_millis, logged, open_cache, serializer, BackedSessionMap, InvalidationOutcome,
    RecordCache, SessionRecord,
};
use crate::cache::{Cache, CacheManager};
use crate::config::{CacheStoreConfig, SessionManagerConfig};
use crate::error::{CacheStoreError, Result};
use crate::logging::{cache_invoke, cache_return, describe_bytes};
use crate::session::BackedSession;

pub struct MultiRowStore {
    store_id: String,
    meta: RecordCache<SessionInfo>,
    attributes_name: String,
    attributes: Arc<dyn Cache<MultiRowKey, Vec<u8>>>,
}

impl MultiRowStore {
    /// Opens, or creates, the metadata and attribute caches of `store_id`.
    pub fn open<M: CacheManager>(
        manager: &M,
        store_id: &str,
        config: SessionManagerConfig,
        store_config: &CacheStoreConfig,
    ) -> Result<Self> {
        let meta_name = meta_cache_name(store_id);
        let meta = open_cache::<M, String, SessionInfo>(manager, &meta_name, store_config)?;
        let attributes_name = attribute_cache_name(store_id);
        let attributes =
            open_cache::<M, MultiRowKey, Vec<u8>>(manager, &attributes_name, store_config)?;
        tracing::info!(
            store = store_id,
            meta = %meta_name,
            attributes = %attributes_name,
            "opened multi-row session store"
        );

        Ok(Self {
            store_id: store_id.to_owned(),
            meta: RecordCache::new(meta_name, meta, config),
            attributes_name,
            attributes,
        })
    }

    fn hide_values(&self) -> bool {
        self.meta.config.hide_session_values
    }

    fn get_attribute(&self, key: &MultiRowKey) -> Result<Option<Vec<u8>>> {
        cache_invoke!(self.attributes_name, "get", key = %key);
        let bytes = self.attributes.get(key)?;
        cache_return!(
            self.attributes_name,
            "get",
            value = ?bytes.as_deref().map(|bytes| describe_bytes(bytes, self.hide_values()))
        );
        Ok(bytes)
    }

    fn put_attribute(&self, key: MultiRowKey, bytes: Vec<u8>) -> Result<()> {
        cache_invoke!(
            self.attributes_name,
            "put",
            key = %key,
            value = %describe_bytes(&bytes, self.hide_values())
        );
        self.attributes.put(key, bytes)?;
        cache_return!(self.attributes_name, "put");
        Ok(())
    }

    fn remove_attribute(&self, key: &MultiRowKey) -> Result<bool> {
        cache_invoke!(self.attributes_name, "remove", key = %key);
        let removed = self.attributes.remove(key)?;
        cache_return!(self.attributes_name, "remove", removed);
        Ok(removed)
    }

    fn remove_attributes(&self, keys: &[MultiRowKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        cache_invoke!(self.attributes_name, "removeAll", count = keys.len());
        self.attributes.remove_all(keys)?;
        cache_return!(self.attributes_name, "removeAll");
        Ok(())
    }

    /// Removes the attribute entries a metadata record tracks.
    fn remove_tracked_attributes(&self, id: &str, info: &SessionInfo) -> Result<()> {
        let keys: Vec<MultiRowKey> = info
            .session_property_ids()
            .into_iter()
            .flatten()
            .map(|name| MultiRowKey::new(id, name))
            .collect();
        self.remove_attributes(&keys)
    }

    /// Removes every attribute entry of `id` by scanning the attribute cache.
    /// Only needed when no metadata record says which names exist.
    fn sweep_attributes(&self, id: &str) -> Result<()> {
        cache_invoke!(self.attributes_name, "iterator");
        let keys: Vec<MultiRowKey> = self
            .attributes
            .entries()?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key.session_id == id)
            .collect();
        cache_return!(self.attributes_name, "iterator", matched = keys.len());
        self.remove_attributes(&keys)
    }

    fn insert(&self, session: &mut BackedSession) -> Result<()> {
        let id = session.id().to_owned();
        let info = SessionInfo::new(
            session.creation_time(),
            session.max_inactive_interval(),
            session.listener_flag(),
            session.user_name().map(str::to_owned),
        );
        if !self.meta.put_if_absent(&id, info)? {
            return Err(CacheStoreError::DuplicateSession { id });
        }
        session.mark_inserted();
        session.set_last_write_last_access_time(session.creation_time());
        Ok(())
    }

    fn load_one(&self, name: &str, session: &BackedSession) -> Result<Option<AttributeValue>> {
        if session.populated_app_data() {
            return Ok(None);
        }
        let Some(bytes) = self.get_attribute(&MultiRowKey::new(session.id(), name))? else {
            return Ok(None);
        };
        let value = serializer::deserialize(&bytes)?;

        // The session may have been invalidated after the attribute was read.
        if !self.meta.contains_key(session.id())? {
            tracing::debug!(
                session = session.id(),
                name,
                "session removed while loading attribute"
            );
            return Ok(None);
        }
        Ok(Some(value))
    }

    fn all_values(&self, session: &BackedSession) -> Result<HashMap<String, AttributeValue>> {
        let Some(info) = self.meta.get(session.id())? else {
            return Ok(HashMap::new());
        };
        let mut values = HashMap::new();
        for name in info.session_property_ids().into_iter().flatten() {
            if session.app_data_removals().contains(name)
                || session.app_data_changes().contains(name)
            {
                continue;
            }
            if let Some(bytes) = self.get_attribute(&MultiRowKey::new(session.id(), name))? {
                values.insert(name.clone(), serializer::deserialize(&bytes)?);
            }
        }
        Ok(values)
    }

    /// Writes changed attributes, deletes removed ones, then records both in the
    /// metadata's property-id set. The session keeps its pending names until
    /// every write has succeeded.
    fn handle_property_hits(&self, session: &mut BackedSession) -> Result<()> {
        let id = session.id().to_owned();
        let names: Vec<&String> = if self.meta.config.write_all_properties {
            session.attributes().keys().collect()
        } else {
            session.app_data_changes().iter().collect()
        };
        if names.iter().any(|name| name.as_str() == id) {
            return Err(SessionStoreError::PropertyIdIsSessionId { property_id: id }.into());
        }
        let mut writes = Vec::with_capacity(names.len());
        for name in names {
            if let Some(value) = session.attribute(name) {
                writes.push((name.clone(), serializer::serialize(value)?));
            }
        }
        let removals = session.app_data_removals().clone();

        let mut written = BTreeSet::new();
        for (name, bytes) in writes {
            self.put_attribute(MultiRowKey::new(id.as_str(), name.as_str()), bytes)?;
            written.insert(name);
        }
        for name in &removals {
            self.remove_attribute(&MultiRowKey::new(id.as_str(), name.as_str()))?;
        }

        if !written.is_empty() || !removals.is_empty() {
            let mut backoff = Backoff::new();
            loop {
                let Some(old) = self.meta.get(&id)? else {
                    break;
                };
                let mut info = old.clone();
                info.add_session_property_ids(written.iter().cloned());
                info.remove_session_property_ids(removals.iter());
                if info == old || self.meta.replace(&id, &old, info)? {
                    break;
                }
                backoff.wait();
            }
        }
        session.clear_property_hits();
        Ok(())
    }

    fn persist(&self, session: &mut BackedSession, prop_hit: bool) -> Result<bool> {
        if self.meta.nothing_to_persist(session, prop_hit) {
            session.clear_write_hits();
            return Ok(true);
        }
        if prop_hit {
            self.handle_property_hits(session)?;
        }
        let id = session.id().to_owned();
        self.meta.persist_metadata(&id, session, |_| Ok(()))
    }

    fn remove(&self, id: &str) -> Result<()> {
        match self.meta.get_and_remove(id)? {
            Some(info) => self.remove_tracked_attributes(id, &info),
            None => self.sweep_attributes(id),
        }
    }

    fn invalidate(&self, now: i64) -> Result<InvalidationOutcome> {
        if !self.meta.config.enable_eos_write {
            self.meta.write_cached_last_access_times(str::to_owned)?;
        }
        let mut outcome = InvalidationOutcome::default();
        if !self.meta.claim_invalidation(now)? {
            return Ok(outcome);
        }
        self.expire_sessions(now, &mut outcome)?;
        self.expire_listener_sessions(now, &mut outcome)?;
        tracing::info!(
            store = %self.store_id,
            expired = outcome.expired.len(),
            listener_sessions = outcome.listener_sessions.len(),
            "invalidation pass complete"
        );
        Ok(outcome)
    }

    fn expire_sessions(&self, now: i64, outcome: &mut InvalidationOutcome) -> Result<()> {
        let start = current_time_millis();
        for (id, info) in self.meta.sessions()? {
            if self.meta.scan_overran(start) {
                tracing::debug!(
                    store = %self.store_id,
                    "invalidation scan ran past its check interval"
                );
                break;
            }
            if info.has_binding_listener() || !info.is_expired(now) {
                continue;
            }
            if self.meta.remove_if(&id, &info)? {
                self.remove_tracked_attributes(&id, &info)?;
                outcome.expired.push(id);
            }
        }
        Ok(())
    }

    fn expire_listener_sessions(&self, now: i64, outcome: &mut InvalidationOutcome) -> Result<()> {
        for (id, info) in self.meta.sessions()? {
            if !info.has_binding_listener() || !info.is_expired(now) {
                continue;
            }
            let mut session = info.restore(&id);
            let values = self.all_values(&session)?;
            session.load_attributes(values);
            if self.meta.remove_if(&id, &info)? {
                session.invalidate();
                self.remove_tracked_attributes(&id, &info)?;
                outcome.listener_sessions.push(session);
            }
        }
        Ok(())
    }
}

impl BackedSessionMap for MultiRowStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    fn insert_session(&self, session: &mut BackedSession) -> Result<()> {
        logged("insert_session", self.insert(session))
    }

    fn is_present(&self, id: &str) -> Result<bool> {
        logged("is_present", self.meta.contains_key(id))
    }

    fn read_from_external(&self, id: &str) -> Result<Option<BackedSession>> {
        let record = logged("read_from_external", self.meta.get(id))?;
        Ok(record.map(|info| info.restore(id)))
    }

    fn load_one_value(
        &self,
        name: &str,
        session: &BackedSession,
    ) -> Result<Option<AttributeValue>> {
        logged("load_one_value", self.load_one(name, session))
    }

    fn get_all_values(&self, session: &BackedSession) -> Result<HashMap<String, AttributeValue>> {
        logged("get_all_values", self.all_values(session))
    }

    fn persist_session(&self, session: &mut BackedSession, prop_hit: bool) -> Result<bool> {
        logged("persist_session", self.persist(session, prop_hit))
    }

    fn update_last_access_time(&self, session: &mut BackedSession, now: i64) -> Result<u32> {
        logged(
            "update_last_access_time",
            self.meta.update_last_access_time(session.id(), now),
        )
    }

    fn over_qualified_last_access_time_update(
        &self,
        session: &mut BackedSession,
        now: i64,
    ) -> Result<u32> {
        let id = session.id().to_owned();
        logged(
            "over_qualified_last_access_time_update",
            self.meta.over_qualified_update(&id, session, now),
        )
    }

    fn remove_persisted_session(&self, id: &str) -> Result<()> {
        logged("remove_persisted_session", self.remove(id))
    }

    fn set_max_inactive_to_zero(&self, id: &str) -> Result<u32> {
        logged("set_max_inactive_to_zero", self.meta.set_max_inactive_to_zero(id))
    }

    fn cache_last_access_time(&self, id: &str, time: i64) {
        self.meta.cache_last_access_time(id, time);
    }

    fn perform_invalidation(&self, now: i64) -> Result<InvalidationOutcome> {
        logged("perform_invalidation", self.invalidate(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheManager;

    fn store(manager: &MemoryCacheManager) -> MultiRowStore {
        MultiRowStore::open(
            manager,
            "default_host/app",
            SessionManagerConfig::default(),
            &CacheStoreConfig::default(),
        )
        .expect("store opens")
    }

    #[test]
    fn caches_are_named_after_the_encoded_store_id() {
        let manager = MemoryCacheManager::new();
        let _store = store(&manager);
        assert_eq!(
            manager.cache_names(),
            vec![
                "com.ibm.ws.session.attr.default_host%2Fapp".to_owned(),
                "com.ibm.ws.session.meta.default_host%2Fapp".to_owned(),
            ]
        );
    }

    #[test]
    fn property_named_like_the_session_is_rejected() {
        let manager = MemoryCacheManager::new();
        let store = store(&manager);
        let mut session = BackedSession::new("s1", 1_000, 60);
        store.insert_session(&mut session).expect("insert");

        session.set_attribute("s1", AttributeValue::Boolean(true));
        assert!(matches!(
            store.persist_session(&mut session, true),
            Err(CacheStoreError::Record(SessionStoreError::PropertyIdIsSessionId { .. }))
        ));
    }

    #[test]
    #[tracing_test::traced_test]
    fn cache_calls_are_logged_without_values() {
        let manager = MemoryCacheManager::new();
        let store = store(&manager);
        let mut session = BackedSession::new("s1", 1_000, 60);
        store.insert_session(&mut session).expect("insert");
        session.set_attribute("n", AttributeValue::Integer(300));
        store.persist_session(&mut session, true).expect("persist");

        assert!(logs_contain("==> invoke"));
        assert!(logs_contain("<== return"));
        assert!(logs_contain("putIfAbsent"));
        assert!(logs_contain("byte[4]"));
        assert!(!logs_contain("byte[4]: "));
    }

    #[test]
    fn removal_without_metadata_sweeps_attributes() {
        let manager = MemoryCacheManager::new();
        let store = store(&manager);
        store
            .put_attribute(MultiRowKey::new("orphan", "a"), vec![0, 8, 1])
            .expect("put");
        store
            .put_attribute(MultiRowKey::new("other", "a"), vec![0, 8, 1])
            .expect("put");

        store.remove_persisted_session("orphan").expect("remove");

        assert_eq!(
            store.get_attribute(&MultiRowKey::new("orphan", "a")).expect("get"),
            None
        );
        assert!(store
            .get_attribute(&MultiRowKey::new("other", "a"))
            .expect("get")
            .is_some());
    }
}
