//! HTTP session persistence over a JCache-style key/value cache.
//!
//! Sessions are stored through a [`BackedSessionMap`] in one of two layouts
//! ([`StorageMode`]). Attribute values are serialized with the compact builtin
//! codec from `attribute_codec` when their type has one, and as a generic object
//! stream otherwise.
//!
//! # Public API Overview
//! - [`CacheStoreService`] owns the lazily created [`CacheManager`] and opens stores.
//! - [`MultiRowStore`] and [`SingleRowStore`] implement the persistence operations.
//! - [`BackedSession`] is the in-memory session with its pending changes.
//! - [`MemoryCacheManager`] is a process-local provider.
//!
//! Stores never lock: concurrent writers from other members are resolved with
//! compare-and-replace on the provider's per-key atomic operations.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod session;
pub mod store;

pub use crate::cache::{
    Cache, CacheConfiguration, CacheKey, CacheManager, CacheStatistics, CacheValue, MemoryCache,
    MemoryCacheManager,
};
pub use crate::config::{CacheStoreConfig, SessionManagerConfig, StorageMode};
pub use crate::error::{CacheError, CacheStoreError, Result};
pub use crate::service::CacheStoreService;
pub use crate::session::{BackedSession, HTTP_SESSION_BINDING_LISTENER, HTTP_SESSION_LISTENER};
pub use crate::store::serializer::{deserialize, serialize, OBJECT_STREAM_HEADER};
pub use crate::store::{
    current_time_millis, BackedSessionMap, InvalidationOutcome, MultiRowStore, SingleRowStore,
};

pub use attribute_codec::AttributeValue;
