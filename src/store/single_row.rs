//! One record per session holding its metadata and the whole attribute map.
//!
//! The attribute map is stored as an [`AttributeBlob`]: a varint entry count,
//! then for each entry in name order a varint name length, the UTF-8 name, a
//! varint value length and the serialized value.

use std::collections::{BTreeMap, HashMap};

use attribute_codec::varint::{decode_int_var_int, push_int_var_int};
use attribute_codec::AttributeValue;
use session_store::{
    data_cache_name, AttributeBlob, SessionData, SessionStoreError, SingleRowKey,
};

use super::{
    current_time_millis, logged, open_cache, serializer, BackedSessionMap, InvalidationOutcome,
    RecordCache, SessionRecord,
};
use crate::cache::CacheManager;
use crate::config::{CacheStoreConfig, SessionManagerConfig};
use crate::error::{CacheStoreError, Result};
use crate::session::BackedSession;

type SerializedAttributes = BTreeMap<String, Vec<u8>>;

pub struct SingleRowStore {
    store_id: String,
    data: RecordCache<SessionData>,
}

impl SingleRowStore {
    /// Opens, or creates, the data cache of `store_id`.
    pub fn open<M: CacheManager>(
        manager: &M,
        store_id: &str,
        config: SessionManagerConfig,
        store_config: &CacheStoreConfig,
    ) -> Result<Self> {
        let name = data_cache_name(store_id);
        let cache = open_cache::<M, String, SessionData>(manager, &name, store_config)?;
        tracing::info!(store = store_id, data = %name, "opened single-row session store");

        Ok(Self {
            store_id: store_id.to_owned(),
            data: RecordCache::new(name, cache, config),
        })
    }

    fn row_key(&self, id: &str) -> String {
        SingleRowKey::primary(id, self.store_id.as_str()).to_string()
    }

    /// Session id of a primary row of this store.
    fn session_id_of(&self, key: &str) -> Option<String> {
        match key.parse::<SingleRowKey>() {
            Ok(row) if row.is_primary() && row.store_id == self.store_id => Some(row.session_id),
            Ok(_) => None,
            Err(error) => {
                tracing::debug!(key, %error, "skipping foreign key during invalidation");
                None
            }
        }
    }

    fn insert(&self, session: &mut BackedSession) -> Result<()> {
        let data = SessionData::new(
            session.creation_time(),
            session.max_inactive_interval(),
            session.listener_flag(),
            session.user_name().map(str::to_owned),
        );
        if !self.data.put_if_absent(&self.row_key(session.id()), data)? {
            return Err(CacheStoreError::DuplicateSession {
                id: session.id().to_owned(),
            });
        }
        session.mark_inserted();
        session.set_last_write_last_access_time(session.creation_time());
        Ok(())
    }

    fn load_one(&self, name: &str, session: &BackedSession) -> Result<Option<AttributeValue>> {
        if session.populated_app_data() {
            return Ok(None);
        }
        let Some(data) = self.data.get(&self.row_key(session.id()))? else {
            return Ok(None);
        };
        let Some(blob) = data.attributes() else {
            return Ok(None);
        };
        decode_attributes(blob)?
            .get(name)
            .map(|bytes| serializer::deserialize(bytes))
            .transpose()
    }

    fn all_values(&self, session: &BackedSession) -> Result<HashMap<String, AttributeValue>> {
        let Some(data) = self.data.get(&self.row_key(session.id()))? else {
            return Ok(HashMap::new());
        };
        values_of(&data, |name| {
            session.app_data_removals().contains(name) || session.app_data_changes().contains(name)
        })
    }

    fn persist(&self, session: &mut BackedSession, prop_hit: bool) -> Result<bool> {
        if self.data.nothing_to_persist(session, prop_hit) {
            session.clear_write_hits();
            return Ok(true);
        }

        let id = session.id().to_owned();
        let mut writes = SerializedAttributes::new();
        let mut removals = Vec::new();
        if prop_hit {
            let names: Vec<&String> = if self.data.config.write_all_properties {
                session.attributes().keys().collect()
            } else {
                session.app_data_changes().iter().collect()
            };
            for name in names {
                if *name == id {
                    return Err(SessionStoreError::PropertyIdIsSessionId {
                        property_id: name.clone(),
                    }
                    .into());
                }
                if let Some(value) = session.attribute(name) {
                    writes.insert(name.clone(), serializer::serialize(value)?);
                }
            }
            removals.extend(session.app_data_removals().iter().cloned());
        }

        let persisted = self.data.persist_metadata(&self.row_key(&id), session, |data| {
            if !prop_hit {
                return Ok(());
            }
            let mut attributes = match data.attributes() {
                Some(blob) => decode_attributes(blob)?,
                None => SerializedAttributes::new(),
            };
            attributes.extend(writes.iter().map(|(name, bytes)| (name.clone(), bytes.clone())));
            for name in &removals {
                attributes.remove(name);
            }
            data.set_attributes(Some(encode_attributes(&attributes)));
            Ok(())
        })?;
        if persisted && prop_hit {
            session.clear_property_hits();
        }
        Ok(persisted)
    }

    fn invalidate(&self, now: i64) -> Result<InvalidationOutcome> {
        if !self.data.config.enable_eos_write {
            self.data
                .write_cached_last_access_times(|id| self.row_key(id))?;
        }
        let mut outcome = InvalidationOutcome::default();
        if !self.data.claim_invalidation(now)? {
            return Ok(outcome);
        }

        let start = current_time_millis();
        for (key, data) in self.data.sessions()? {
            if self.data.scan_overran(start) {
                tracing::debug!(
                    store = %self.store_id,
                    "invalidation scan ran past its check interval"
                );
                break;
            }
            if !data.is_expired(now) {
                continue;
            }
            let Some(id) = self.session_id_of(&key) else {
                continue;
            };
            if !data.has_binding_listener() {
                if self.data.remove_if(&key, &data)? {
                    outcome.expired.push(id);
                }
                continue;
            }
            let mut session = data.restore(&id);
            session.load_attributes(values_of(&data, |_| false)?);
            if self.data.remove_if(&key, &data)? {
                session.invalidate();
                outcome.listener_sessions.push(session);
            }
        }
        tracing::info!(
            store = %self.store_id,
            expired = outcome.expired.len(),
            listener_sessions = outcome.listener_sessions.len(),
            "invalidation pass complete"
        );
        Ok(outcome)
    }
}

impl BackedSessionMap for SingleRowStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    fn insert_session(&self, session: &mut BackedSession) -> Result<()> {
        logged("insert_session", self.insert(session))
    }

    fn is_present(&self, id: &str) -> Result<bool> {
        logged("is_present", self.data.contains_key(&self.row_key(id)))
    }

    fn read_from_external(&self, id: &str) -> Result<Option<BackedSession>> {
        let record = logged("read_from_external", self.data.get(&self.row_key(id)))?;
        Ok(record.map(|data| data.restore(id)))
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
            self.data
                .update_last_access_time(&self.row_key(session.id()), now),
        )
    }

    fn over_qualified_last_access_time_update(
        &self,
        session: &mut BackedSession,
        now: i64,
    ) -> Result<u32> {
        let key = self.row_key(session.id());
        logged(
            "over_qualified_last_access_time_update",
            self.data.over_qualified_update(&key, session, now),
        )
    }

    fn remove_persisted_session(&self, id: &str) -> Result<()> {
        logged(
            "remove_persisted_session",
            self.data.get_and_remove(&self.row_key(id)).map(drop),
        )
    }

    fn set_max_inactive_to_zero(&self, id: &str) -> Result<u32> {
        logged(
            "set_max_inactive_to_zero",
            self.data.set_max_inactive_to_zero(&self.row_key(id)),
        )
    }

    fn cache_last_access_time(&self, id: &str, time: i64) {
        self.data.cache_last_access_time(id, time);
    }

    fn perform_invalidation(&self, now: i64) -> Result<InvalidationOutcome> {
        logged("perform_invalidation", self.invalidate(now))
    }
}

/// Deserialized attributes of a record, leaving out names `skip` accepts.
fn values_of(
    data: &SessionData,
    skip: impl Fn(&str) -> bool,
) -> Result<HashMap<String, AttributeValue>> {
    let Some(blob) = data.attributes() else {
        return Ok(HashMap::new());
    };
    let mut values = HashMap::new();
    for (name, bytes) in decode_attributes(blob)? {
        if skip(&name) {
            continue;
        }
        let value = serializer::deserialize(&bytes)?;
        values.insert(name, value);
    }
    Ok(values)
}

fn encode_attributes(attributes: &SerializedAttributes) -> AttributeBlob {
    let mut out = Vec::new();
    push_length(attributes.len(), &mut out);
    for (name, bytes) in attributes {
        push_length(name.len(), &mut out);
        out.extend_from_slice(name.as_bytes());
        push_length(bytes.len(), &mut out);
        out.extend_from_slice(bytes);
    }
    AttributeBlob::new(out)
}

fn push_length(len: usize, out: &mut Vec<u8>) {
    // Attribute maps and values stay far below i32::MAX bytes.
    push_int_var_int(i32::try_from(len).unwrap_or(i32::MAX), out);
}

fn decode_attributes(blob: &AttributeBlob) -> Result<SerializedAttributes> {
    let bytes = blob.as_bytes();
    let mut cursor = 0;
    let count = read_length(bytes, &mut cursor)?;
    let mut attributes = SerializedAttributes::new();
    for _ in 0..count {
        let name_len = read_length(bytes, &mut cursor)?;
        let name = std::str::from_utf8(take(bytes, &mut cursor, name_len)?)
            .map_err(|_| CacheStoreError::CorruptAttributes {
                reason: "attribute name is not UTF-8",
            })?
            .to_owned();
        let value_len = read_length(bytes, &mut cursor)?;
        let value = take(bytes, &mut cursor, value_len)?.to_vec();
        attributes.insert(name, value);
    }
    if cursor != bytes.len() {
        return Err(CacheStoreError::CorruptAttributes {
            reason: "trailing bytes after last attribute",
        });
    }
    Ok(attributes)
}

fn read_length(bytes: &[u8], cursor: &mut usize) -> Result<usize> {
    let (len, consumed) = decode_int_var_int(bytes, *cursor)?;
    *cursor += consumed;
    usize::try_from(len).map_err(|_| CacheStoreError::CorruptAttributes {
        reason: "negative length",
    })
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or(CacheStoreError::CorruptAttributes {
            reason: "attribute entry runs past the end",
        })?;
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}
