use std::fmt;
use std::str::FromStr;

use crate::error::SessionStoreError;

/// Meta-cache key holding the invalidation coordination record.
pub const INVAL_KEY: &str = ".inval";

pub const META_CACHE_PREFIX: &str = "com.ibm.ws.session.meta.";
pub const ATTRIBUTE_CACHE_PREFIX: &str = "com.ibm.ws.session.attr.";
pub const DATA_CACHE_PREFIX: &str = "com.ibm.ws.session.data.";

/// Percent-encodes the characters cache names may not contain.
///
/// `%` is replaced first so the escapes added for `/` and `:` survive.
#[must_use]
pub fn encode_store_id(store_id: &str) -> String {
    store_id
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace(':', "%3A")
}

#[must_use]
pub fn meta_cache_name(store_id: &str) -> String {
    format!("{META_CACHE_PREFIX}{}", encode_store_id(store_id))
}

#[must_use]
pub fn attribute_cache_name(store_id: &str) -> String {
    format!("{ATTRIBUTE_CACHE_PREFIX}{}", encode_store_id(store_id))
}

#[must_use]
pub fn data_cache_name(store_id: &str) -> String {
    format!("{DATA_CACHE_PREFIX}{}", encode_store_id(store_id))
}

/// `sessionId+propertyId@storeId`. The primary row of a session has
/// `property_id == session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SingleRowKey {
    pub session_id: String,
    pub property_id: String,
    pub store_id: String,
}

impl SingleRowKey {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        property_id: impl Into<String>,
        store_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            property_id: property_id.into(),
            store_id: store_id.into(),
        }
    }

    #[must_use]
    pub fn primary(session_id: &str, store_id: impl Into<String>) -> Self {
        Self::new(session_id, session_id, store_id)
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.session_id == self.property_id
    }
}

impl fmt::Display for SingleRowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}@{}",
            self.session_id, self.property_id, self.store_id
        )
    }
}

/// Session ids never contain `+` and store ids never contain `@`, so the key
/// splits on the first `+` and the last `@`.
impl FromStr for SingleRowKey {
    type Err = SessionStoreError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let (session_id, rest) = key
            .split_once('+')
            .ok_or_else(|| SessionStoreError::invalid_key(key, "missing '+' separator"))?;
        let (property_id, store_id) = rest
            .rsplit_once('@')
            .ok_or_else(|| SessionStoreError::invalid_key(key, "missing '@' separator"))?;
        if session_id.is_empty() {
            return Err(SessionStoreError::invalid_key(key, "empty session id"));
        }
        Ok(Self::new(session_id, property_id, store_id))
    }
}

/// Key of one attribute entry in the multi-row attribute cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MultiRowKey {
    pub session_id: String,
    pub property_name: String,
}

impl MultiRowKey {
    #[must_use]
    pub fn new(session_id: impl Into<String>, property_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            property_name: property_name.into(),
        }
    }
}

impl fmt::Display for MultiRowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.session_id, self.property_name)
    }
}
