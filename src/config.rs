//! Session manager and cache store configuration.

use std::env;
use std::str::FromStr;

/// How a session is laid out in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// One record per session holding every attribute.
    SingleRow,
    /// One metadata record per session plus one entry per attribute.
    #[default]
    MultiRow,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single-row" | "single_row" | "single" => Ok(Self::SingleRow),
            "multi-row" | "multi_row" | "multi" => Ok(Self::MultiRow),
            other => Err(format!("unknown storage mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionManagerConfig {
    /// Write every attribute on each persist, not only the changed ones.
    pub write_all_properties: bool,
    /// Persist at the end of each servlet service call.
    pub enable_eos_write: bool,
    pub scheduled_invalidation: bool,
    pub invalidation_check_interval_secs: i64,
    /// Keep attribute values out of log output.
    pub hide_session_values: bool,
    pub storage_mode: StorageMode,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            write_all_properties: false,
            enable_eos_write: true,
            scheduled_invalidation: false,
            invalidation_check_interval_secs: 60,
            hide_session_values: true,
            storage_mode: StorageMode::default(),
        }
    }
}

impl SessionManagerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            write_all_properties: env_flag_or(
                "SESSION_CACHE_WRITE_ALL_PROPERTIES",
                defaults.write_all_properties,
            ),
            enable_eos_write: env_flag_or("SESSION_CACHE_EOS_WRITE", defaults.enable_eos_write),
            scheduled_invalidation: env_flag_or(
                "SESSION_CACHE_SCHEDULED_INVALIDATION",
                defaults.scheduled_invalidation,
            ),
            invalidation_check_interval_secs: env_parsed_or(
                "SESSION_CACHE_INVALIDATION_CHECK_INTERVAL",
                defaults.invalidation_check_interval_secs,
            ),
            hide_session_values: env_flag_or(
                "SESSION_CACHE_HIDE_VALUES",
                defaults.hide_session_values,
            ),
            storage_mode: env_parsed_or("SESSION_CACHE_STORAGE_MODE", defaults.storage_mode),
        }
    }

    #[must_use]
    pub fn with_write_all_properties(mut self, enabled: bool) -> Self {
        self.write_all_properties = enabled;
        self
    }

    #[must_use]
    pub fn with_eos_write(mut self, enabled: bool) -> Self {
        self.enable_eos_write = enabled;
        self
    }

    #[must_use]
    pub fn with_scheduled_invalidation(mut self, enabled: bool) -> Self {
        self.scheduled_invalidation = enabled;
        self
    }

    #[must_use]
    pub fn with_invalidation_check_interval_secs(mut self, seconds: i64) -> Self {
        self.invalidation_check_interval_secs = seconds;
        self
    }

    #[must_use]
    pub fn with_hide_session_values(mut self, hide: bool) -> Self {
        self.hide_session_values = hide;
        self
    }

    #[must_use]
    pub fn with_storage_mode(mut self, storage_mode: StorageMode) -> Self {
        self.storage_mode = storage_mode;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStoreConfig {
    /// Provider-specific configuration URI.
    pub uri: Option<String>,
    /// Provider can hold values by reference, so caches skip store-by-value copies.
    pub supports_store_by_reference: bool,
    pub enable_monitoring: bool,
}

impl CacheStoreConfig {
    pub fn from_env() -> Self {
        Self {
            uri: env_string_opt("SESSION_CACHE_URI"),
            supports_store_by_reference: env_flag("SESSION_CACHE_STORE_BY_REFERENCE"),
            enable_monitoring: env_flag("SESSION_CACHE_MONITORING"),
        }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_store_by_reference(mut self, supported: bool) -> Self {
        self.supports_store_by_reference = supported;
        self
    }

    #[must_use]
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.enable_monitoring = enabled;
        self
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

/// `1` enables, `0` disables, anything else keeps `default`.
fn env_flag_or(key: &str, default: bool) -> bool {
    match env::var(key).as_deref() {
        Ok("1") => true,
        Ok("0") => false,
        _ => default,
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parsed_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_string_opt(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(key, value = %raw, %error, "ignoring unparsable configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheStoreConfig, SessionManagerConfig, StorageMode};
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const MANAGER_KEYS: [&str; 6] = [
        "SESSION_CACHE_WRITE_ALL_PROPERTIES",
        "SESSION_CACHE_EOS_WRITE",
        "SESSION_CACHE_SCHEDULED_INVALIDATION",
        "SESSION_CACHE_INVALIDATION_CHECK_INTERVAL",
        "SESSION_CACHE_HIDE_VALUES",
        "SESSION_CACHE_STORAGE_MODE",
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_manager_env() -> Vec<EnvGuard> {
        MANAGER_KEYS
            .iter()
            .map(|&key| set_env_guard(key, None))
            .collect()
    }

    #[test]
    fn unset_env_yields_defaults() {
        let _lock = env_lock();
        let _guards = clear_manager_env();

        assert_eq!(SessionManagerConfig::from_env(), SessionManagerConfig::default());
        let config = SessionManagerConfig::default();
        assert!(config.enable_eos_write);
        assert!(config.hide_session_values);
        assert_eq!(config.storage_mode, StorageMode::MultiRow);
    }

    #[test]
    fn env_overrides_flags_and_values() {
        let _lock = env_lock();
        let _guards = clear_manager_env();
        let _g1 = set_env_guard("SESSION_CACHE_WRITE_ALL_PROPERTIES", Some("1"));
        let _g2 = set_env_guard("SESSION_CACHE_EOS_WRITE", Some("0"));
        let _g3 = set_env_guard("SESSION_CACHE_INVALIDATION_CHECK_INTERVAL", Some("15"));
        let _g4 = set_env_guard("SESSION_CACHE_STORAGE_MODE", Some("single-row"));
        let _g5 = set_env_guard("SESSION_CACHE_HIDE_VALUES", Some("0"));

        let config = SessionManagerConfig::from_env();
        assert!(config.write_all_properties);
        assert!(!config.enable_eos_write);
        assert_eq!(config.invalidation_check_interval_secs, 15);
        assert_eq!(config.storage_mode, StorageMode::SingleRow);
        assert!(!config.hide_session_values);
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let _lock = env_lock();
        let _guards = clear_manager_env();
        let _g1 = set_env_guard("SESSION_CACHE_INVALIDATION_CHECK_INTERVAL", Some("soon"));
        let _g2 = set_env_guard("SESSION_CACHE_STORAGE_MODE", Some("sideways"));
        let _g3 = set_env_guard("SESSION_CACHE_EOS_WRITE", Some("yes"));

        let config = SessionManagerConfig::from_env();
        assert_eq!(config.invalidation_check_interval_secs, 60);
        assert_eq!(config.storage_mode, StorageMode::MultiRow);
        assert!(config.enable_eos_write);
    }

    #[test]
    fn store_config_reads_uri_and_flags() {
        let _lock = env_lock();
        let _g1 = set_env_guard("SESSION_CACHE_URI", Some("file:///etc/cache.xml"));
        let _g2 = set_env_guard("SESSION_CACHE_STORE_BY_REFERENCE", Some("1"));
        let _g3 = set_env_guard("SESSION_CACHE_MONITORING", None);

        let config = CacheStoreConfig::from_env();
        assert_eq!(config.uri.as_deref(), Some("file:///etc/cache.xml"));
        assert!(config.supports_store_by_reference);
        assert!(!config.enable_monitoring);
    }

    #[test]
    fn blank_uri_is_ignored() {
        let _lock = env_lock();
        let _g1 = set_env_guard("SESSION_CACHE_URI", Some("   "));
        assert!(CacheStoreConfig::from_env().uri.is_none());
    }

    #[test]
    fn builders_chain() {
        let config = SessionManagerConfig::default()
            .with_storage_mode(StorageMode::SingleRow)
            .with_eos_write(false)
            .with_invalidation_check_interval_secs(5);
        assert_eq!(config.storage_mode, StorageMode::SingleRow);
        assert!(!config.enable_eos_write);
        assert_eq!(config.invalidation_check_interval_secs, 5);

        let store = CacheStoreConfig::default().with_uri("mem://").with_monitoring(true);
        assert_eq!(store.uri.as_deref(), Some("mem://"));
        assert!(store.enable_monitoring);
    }
}
