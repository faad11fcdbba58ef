#![allow(dead_code)]

use session_cache::{
    BackedSession, BackedSessionMap, CacheStoreConfig, MemoryCacheManager, MultiRowStore,
    SessionManagerConfig, SingleRowStore, StorageMode,
};

pub const STORE_ID: &str = "default_host/shop";

pub const MODES: [StorageMode; 2] = [StorageMode::MultiRow, StorageMode::SingleRow];

pub fn open_store(
    manager: &MemoryCacheManager,
    config: SessionManagerConfig,
) -> Box<dyn BackedSessionMap> {
    let store_config = CacheStoreConfig::default();
    match config.storage_mode {
        StorageMode::MultiRow => Box::new(
            MultiRowStore::open(manager, STORE_ID, config, &store_config)
                .unwrap_or_else(|err| panic!("multi-row store failed to open: {err}")),
        ),
        StorageMode::SingleRow => Box::new(
            SingleRowStore::open(manager, STORE_ID, config, &store_config)
                .unwrap_or_else(|err| panic!("single-row store failed to open: {err}")),
        ),
    }
}

pub fn config(mode: StorageMode) -> SessionManagerConfig {
    SessionManagerConfig::default().with_storage_mode(mode)
}

/// A session created at `now` and already written to `store`.
pub fn inserted(
    store: &dyn BackedSessionMap,
    id: &str,
    now: i64,
    max_inactive: i32,
) -> BackedSession {
    let mut session = BackedSession::new(id, now, max_inactive);
    store
        .insert_session(&mut session)
        .unwrap_or_else(|err| panic!("insert of {id} failed: {err}"));
    session
}

/// The persisted view of `id`, as another member would see it.
pub fn reread(store: &dyn BackedSessionMap, id: &str) -> BackedSession {
    store
        .read_from_external(id)
        .unwrap_or_else(|err| panic!("read of {id} failed: {err}"))
        .unwrap_or_else(|| panic!("session {id} is missing"))
}
