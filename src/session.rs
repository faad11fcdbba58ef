//! In-memory view of a persisted HTTP session.

use std::collections::{BTreeSet, HashMap};

use attribute_codec::AttributeValue;

/// Listener-type bit: the session has `HttpSessionListener`s.
pub const HTTP_SESSION_LISTENER: i16 = 1;
/// Listener-type bit: an attribute is a binding listener and must see unbinding on expiry.
pub const HTTP_SESSION_BINDING_LISTENER: i16 = 2;

/// A session as the store sees it: metadata, attribute values, and the
/// bookkeeping of what changed since the last persist.
#[derive(Debug, Clone, PartialEq)]
pub struct BackedSession {
    id: String,
    creation_time: i64,
    current_access_time: i64,
    last_write_last_access_time: i64,
    max_inactive_interval: i32,
    listener_flag: i16,
    user_name: Option<String>,
    attributes: HashMap<String, AttributeValue>,
    app_data_changes: BTreeSet<String>,
    app_data_removals: BTreeSet<String>,
    user_write_hit: bool,
    max_inact_write_hit: bool,
    listen_cnt_hit: bool,
    populated_app_data: bool,
    valid: bool,
    is_new: bool,
}

impl BackedSession {
    /// A brand-new session created at `now`.
    #[must_use]
    pub fn new(id: impl Into<String>, now: i64, max_inactive_interval: i32) -> Self {
        Self {
            id: id.into(),
            creation_time: now,
            current_access_time: now,
            last_write_last_access_time: now,
            max_inactive_interval,
            listener_flag: 0,
            user_name: None,
            attributes: HashMap::new(),
            app_data_changes: BTreeSet::new(),
            app_data_removals: BTreeSet::new(),
            user_write_hit: false,
            max_inact_write_hit: false,
            listen_cnt_hit: false,
            populated_app_data: false,
            valid: true,
            is_new: true,
        }
    }

    /// A session rebuilt from a persisted record. Attributes load lazily.
    #[must_use]
    pub fn restored(
        id: impl Into<String>,
        creation_time: i64,
        last_access: i64,
        max_inactive_interval: i32,
        listener_flag: i16,
        user_name: Option<String>,
    ) -> Self {
        Self {
            creation_time,
            current_access_time: last_access,
            last_write_last_access_time: last_access,
            listener_flag,
            user_name,
            is_new: false,
            ..Self::new(id, creation_time, max_inactive_interval)
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn creation_time(&self) -> i64 {
        self.creation_time
    }

    #[must_use]
    pub fn current_access_time(&self) -> i64 {
        self.current_access_time
    }

    pub fn update_last_access_time(&mut self, time: i64) {
        self.current_access_time = time;
    }

    #[must_use]
    pub fn last_write_last_access_time(&self) -> i64 {
        self.last_write_last_access_time
    }

    pub(crate) fn set_last_write_last_access_time(&mut self, time: i64) {
        self.last_write_last_access_time = time;
    }

    #[must_use]
    pub fn max_inactive_interval(&self) -> i32 {
        self.max_inactive_interval
    }

    pub fn set_max_inactive_interval(&mut self, seconds: i32) {
        self.max_inactive_interval = seconds;
        self.max_inact_write_hit = true;
    }

    #[must_use]
    pub fn listener_flag(&self) -> i16 {
        self.listener_flag
    }

    pub fn set_listener_flag(&mut self, flag: i16) {
        self.listener_flag = flag;
        self.listen_cnt_hit = true;
    }

    #[must_use]
    pub fn has_binding_listener(&self) -> bool {
        self.listener_flag & HTTP_SESSION_BINDING_LISTENER != 0
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn set_user_name(&mut self, user_name: Option<String>) {
        self.user_name = user_name;
        self.user_write_hit = true;
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Stores `value` and marks the name as changed.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        let name = name.into();
        self.app_data_removals.remove(&name);
        self.app_data_changes.insert(name.clone());
        self.attributes.insert(name, value);
    }

    /// Drops the value and marks the name as removed.
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.app_data_changes.remove(name);
        self.app_data_removals.insert(name.to_owned());
        self.attributes.remove(name)
    }

    /// Installs values read from the store without marking them as changed.
    pub fn load_attributes(&mut self, values: HashMap<String, AttributeValue>) {
        for (name, value) in values {
            self.attributes.entry(name).or_insert(value);
        }
        self.populated_app_data = true;
    }

    #[must_use]
    pub fn app_data_changes(&self) -> &BTreeSet<String> {
        &self.app_data_changes
    }

    #[must_use]
    pub fn app_data_removals(&self) -> &BTreeSet<String> {
        &self.app_data_removals
    }

    /// Whether any attribute was set or removed since the last persist.
    #[must_use]
    pub fn has_property_hit(&self) -> bool {
        !self.app_data_changes.is_empty() || !self.app_data_removals.is_empty()
    }

    /// Forgets set and removed names once the store holds them.
    pub(crate) fn clear_property_hits(&mut self) {
        self.app_data_changes.clear();
        self.app_data_removals.clear();
    }

    #[must_use]
    pub fn populated_app_data(&self) -> bool {
        self.populated_app_data
    }

    #[must_use]
    pub fn user_write_hit(&self) -> bool {
        self.user_write_hit
    }

    #[must_use]
    pub fn max_inact_write_hit(&self) -> bool {
        self.max_inact_write_hit
    }

    #[must_use]
    pub fn listen_cnt_hit(&self) -> bool {
        self.listen_cnt_hit
    }

    #[must_use]
    pub fn has_metadata_hit(&self) -> bool {
        self.user_write_hit || self.max_inact_write_hit || self.listen_cnt_hit
    }

    pub(crate) fn clear_write_hits(&mut self) {
        self.user_write_hit = false;
        self.max_inact_write_hit = false;
        self.listen_cnt_hit = false;
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_inserted(&mut self) {
        self.is_new = false;
        self.clear_write_hits();
    }
}
