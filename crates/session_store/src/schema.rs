use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionStoreError;

/// Persisted multi-row metadata in positional order:
/// creation time, last access, max inactive seconds, listener types, user, property ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfoRow(
    i64,
    i64,
    i32,
    i16,
    Option<String>,
    Option<BTreeSet<String>>,
);

/// Multi-row session metadata. Attribute payloads live in their own cache
/// entries; this record only tracks which attribute names exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SessionInfoRow", into = "SessionInfoRow")]
pub struct SessionInfo {
    creation_time: i64,
    last_access: i64,
    max_inactive_time: i32,
    listener_types: i16,
    user: Option<String>,
    property_ids: Option<BTreeSet<String>>,
}

impl SessionInfo {
    /// Last access starts at the creation time.
    #[must_use]
    pub fn new(
        creation_time: i64,
        max_inactive_time: i32,
        listener_types: i16,
        user: Option<String>,
    ) -> Self {
        Self {
            creation_time,
            last_access: creation_time,
            max_inactive_time,
            listener_types,
            user,
            property_ids: None,
        }
    }

    #[must_use]
    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    #[must_use]
    pub fn last_access(&self) -> i64 {
        self.last_access
    }

    pub fn set_last_access(&mut self, last_access: i64) {
        self.last_access = last_access;
    }

    #[must_use]
    pub fn max_inactive_time(&self) -> i32 {
        self.max_inactive_time
    }

    pub fn set_max_inactive_time(&mut self, seconds: i32) {
        self.max_inactive_time = seconds;
    }

    #[must_use]
    pub fn listener_types(&self) -> i16 {
        self.listener_types
    }

    pub fn set_listener_types(&mut self, listener_types: i16) {
        self.listener_types = listener_types;
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    #[must_use]
    pub fn session_property_ids(&self) -> Option<&BTreeSet<String>> {
        self.property_ids.as_ref()
    }

    pub fn add_session_property_ids<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.property_ids
            .get_or_insert_with(BTreeSet::new)
            .extend(ids.into_iter().map(Into::into));
    }

    pub fn remove_session_property_ids<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Some(property_ids) = self.property_ids.as_mut() {
            for id in ids {
                property_ids.remove(id.as_ref());
            }
        }
    }

    #[must_use]
    pub fn row(&self) -> SessionInfoRow {
        self.clone().into_row()
    }

    #[must_use]
    pub fn into_row(self) -> SessionInfoRow {
        SessionInfoRow(
            self.creation_time,
            self.last_access,
            self.max_inactive_time,
            self.listener_types,
            self.user,
            self.property_ids,
        )
    }

    #[must_use]
    pub fn from_row(row: SessionInfoRow) -> Self {
        let SessionInfoRow(
            creation_time,
            last_access,
            max_inactive_time,
            listener_types,
            user,
            property_ids,
        ) = row;
        Self {
            creation_time,
            last_access,
            max_inactive_time,
            listener_types,
            user,
            property_ids,
        }
    }

    pub fn to_json(&self) -> Result<String, SessionStoreError> {
        serde_json::to_string(self)
            .map_err(|source| SessionStoreError::row_serialize("session info", source))
    }

    pub fn from_json(json: &str) -> Result<Self, SessionStoreError> {
        serde_json::from_str(json)
            .map_err(|source| SessionStoreError::row_parse("session info", source))
    }
}

impl From<SessionInfoRow> for SessionInfo {
    fn from(row: SessionInfoRow) -> Self {
        Self::from_row(row)
    }
}

impl From<SessionInfo> for SessionInfoRow {
    fn from(info: SessionInfo) -> Self {
        info.into_row()
    }
}

/// Serialized attribute map of a single-row session, compared by content.
///
/// `Debug` prints only the length so records can be logged without leaking values.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeBlob(Vec<u8>);

impl AttributeBlob {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AttributeBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeBlob(byte[{}])", self.0.len())
    }
}

impl From<Vec<u8>> for AttributeBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Persisted single-row record in positional order:
/// creation time, last access, max inactive seconds, listener count, user, attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDataRow(
    i64,
    i64,
    i32,
    i16,
    Option<String>,
    Option<AttributeBlob>,
);

/// Single-row session record holding metadata and the whole attribute map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SessionDataRow", into = "SessionDataRow")]
pub struct SessionData {
    creation_time: i64,
    last_access: i64,
    max_inactive_time: i32,
    listener_count: i16,
    user: Option<String>,
    attributes: Option<AttributeBlob>,
}

impl SessionData {
    #[must_use]
    pub fn new(
        creation_time: i64,
        max_inactive_time: i32,
        listener_count: i16,
        user: Option<String>,
    ) -> Self {
        Self {
            creation_time,
            last_access: creation_time,
            max_inactive_time,
            listener_count,
            user,
            attributes: None,
        }
    }

    #[must_use]
    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    #[must_use]
    pub fn last_access(&self) -> i64 {
        self.last_access
    }

    pub fn set_last_access(&mut self, last_access: i64) {
        self.last_access = last_access;
    }

    #[must_use]
    pub fn max_inactive_time(&self) -> i32 {
        self.max_inactive_time
    }

    pub fn set_max_inactive_time(&mut self, seconds: i32) {
        self.max_inactive_time = seconds;
    }

    #[must_use]
    pub fn listener_count(&self) -> i16 {
        self.listener_count
    }

    pub fn set_listener_count(&mut self, listener_count: i16) {
        self.listener_count = listener_count;
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn set_user(&mut self, user: Option<String>) {
        self.user = user;
    }

    #[must_use]
    pub fn attributes(&self) -> Option<&AttributeBlob> {
        self.attributes.as_ref()
    }

    pub fn set_attributes(&mut self, attributes: Option<AttributeBlob>) {
        self.attributes = attributes;
    }

    #[must_use]
    pub fn row(&self) -> SessionDataRow {
        self.clone().into_row()
    }

    #[must_use]
    pub fn into_row(self) -> SessionDataRow {
        SessionDataRow(
            self.creation_time,
            self.last_access,
            self.max_inactive_time,
            self.listener_count,
            self.user,
            self.attributes,
        )
    }

    #[must_use]
    pub fn from_row(row: SessionDataRow) -> Self {
        let SessionDataRow(
            creation_time,
            last_access,
            max_inactive_time,
            listener_count,
            user,
            attributes,
        ) = row;
        Self {
            creation_time,
            last_access,
            max_inactive_time,
            listener_count,
            user,
            attributes,
        }
    }

    pub fn to_json(&self) -> Result<String, SessionStoreError> {
        serde_json::to_string(self)
            .map_err(|source| SessionStoreError::row_serialize("session data", source))
    }

    pub fn from_json(json: &str) -> Result<Self, SessionStoreError> {
        serde_json::from_str(json)
            .map_err(|source| SessionStoreError::row_parse("session data", source))
    }
}

impl From<SessionDataRow> for SessionData {
    fn from(row: SessionDataRow) -> Self {
        Self::from_row(row)
    }
}

impl From<SessionData> for SessionDataRow {
    fn from(data: SessionData) -> Self {
        data.into_row()
    }
}
