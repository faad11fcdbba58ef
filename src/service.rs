//! Lazily activated owner of the cache manager.
//!
//! The manager is created on first use, not at construction, so building the
//! service never touches the provider.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::cache::{CacheManager, MemoryCacheManager};
use crate::config::{CacheStoreConfig, SessionManagerConfig, StorageMode};
use crate::error::{CacheError, CacheStoreError, Result};
use crate::store::{self, BackedSessionMap, MultiRowStore, SingleRowStore};

type ManagerFactory<M> =
    Box<dyn Fn(&CacheStoreConfig) -> std::result::Result<M, CacheError> + Send + Sync>;

pub struct CacheStoreService<M: CacheManager> {
    store_config: CacheStoreConfig,
    manager_config: SessionManagerConfig,
    factory: ManagerFactory<M>,
    manager: OnceCell<Arc<M>>,
}

impl<M: CacheManager> CacheStoreService<M> {
    pub fn new(
        store_config: CacheStoreConfig,
        manager_config: SessionManagerConfig,
        factory: impl Fn(&CacheStoreConfig) -> std::result::Result<M, CacheError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            store_config,
            manager_config,
            factory: Box::new(factory),
            manager: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn store_config(&self) -> &CacheStoreConfig {
        &self.store_config
    }

    #[must_use]
    pub fn manager_config(&self) -> &SessionManagerConfig {
        &self.manager_config
    }

    /// Whether a manager was created and is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.manager
            .get()
            .is_some_and(|manager| !manager.is_closed())
    }

    /// The cache manager, created on first call.
    ///
    /// A failed creation is retried on the next call. Once the service has been
    /// deactivated this fails with [`CacheStoreError::NoCacheManager`].
    pub fn cache_manager(&self) -> Result<Arc<M>> {
        let manager = self.manager.get_or_try_init(|| {
            tracing::info!(uri = ?self.store_config.uri, "creating cache manager");
            (self.factory)(&self.store_config)
                .map(Arc::new)
                .map_err(|source| CacheStoreError::ManagerInit {
                    uri: self.store_config.uri.clone(),
                    source,
                })
        })?;
        if manager.is_closed() {
            return Err(CacheStoreError::NoCacheManager);
        }
        Ok(Arc::clone(manager))
    }

    /// Opens the session store of one application in the configured layout.
    pub fn create_store(&self, store_id: &str) -> Result<Box<dyn BackedSessionMap>> {
        let manager = self.cache_manager()?;
        let config = self.manager_config.clone();
        let store: Box<dyn BackedSessionMap> = match self.manager_config.storage_mode {
            StorageMode::MultiRow => Box::new(MultiRowStore::open(
                manager.as_ref(),
                store_id,
                config,
                &self.store_config,
            )?),
            StorageMode::SingleRow => Box::new(SingleRowStore::open(
                manager.as_ref(),
                store_id,
                config,
                &self.store_config,
            )?),
        };
        Ok(store)
    }

    /// Enables statistics on `name` when monitoring is configured.
    pub fn configure_monitoring(&self, name: &str) -> Result<()> {
        let manager = self.cache_manager()?;
        store::configure_monitoring(manager.as_ref(), &self.store_config, name)
    }

    /// Closes the manager if one was created. Stores opened from it fail from
    /// then on.
    pub fn deactivate(&self) {
        if let Some(manager) = self.manager.get() {
            manager.close();
            tracing::info!("cache manager closed");
        }
    }
}

impl CacheStoreService<MemoryCacheManager> {
    /// Service backed by a process-local [`MemoryCacheManager`].
    #[must_use]
    pub fn in_memory(store_config: CacheStoreConfig, manager_config: SessionManagerConfig) -> Self {
        Self::new(store_config, manager_config, |_| Ok(MemoryCacheManager::new()))
    }
}
