//! Session record layouts and cache key formats.
//!
//! Records are persisted positionally: [`SessionInfo`] and [`SessionData`] serialize
//! as JSON arrays whose element order is the stored format, while callers only
//! ever see named accessors.

mod error;
mod keys;
mod schema;

pub use error::SessionStoreError;
pub use keys::{
    attribute_cache_name, data_cache_name, encode_store_id, meta_cache_name, MultiRowKey,
    SingleRowKey, ATTRIBUTE_CACHE_PREFIX, DATA_CACHE_PREFIX, INVAL_KEY, META_CACHE_PREFIX,
};
pub use schema::{AttributeBlob, SessionData, SessionDataRow, SessionInfo, SessionInfoRow};
