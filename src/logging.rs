//! Tracing setup and cache-interaction log helpers.
//!
//! Every cache call is logged at debug level as an invoke/return pair, for example
//! `==> com.ibm.ws.session.meta.app.replace` followed by `<== com.ibm.ws.session.meta.app.replace`.

use std::fmt;

use attribute_codec::limited_bytes_to_string;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the `EnvFilter` directives.
pub const LOG_ENV: &str = "SESSION_CACHE_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

/// Installs a global fmt subscriber filtered by [`LOG_ENV`].
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter())
        .with_target(true)
        .try_init()
        .is_ok()
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Log rendering of a serialized value: `byte[N]`, plus a bounded hex dump
/// when values are not hidden.
#[derive(Clone, Copy)]
pub struct Bytes<'a> {
    bytes: &'a [u8],
    hide: bool,
}

#[must_use]
pub fn describe_bytes(bytes: &[u8], hide: bool) -> Bytes<'_> {
    Bytes { bytes, hide }
}

impl fmt::Display for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "byte[{}]", self.bytes.len())?;
        if !self.hide {
            write!(f, ": {}", limited_bytes_to_string(self.bytes))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

macro_rules! cache_invoke {
    ($cache:expr, $op:expr $(, $($field:tt)+)?) => {
        tracing::debug!(cache = %$cache, op = $op $(, $($field)+)?, "==> invoke")
    };
}

macro_rules! cache_return {
    ($cache:expr, $op:expr $(, $($field:tt)+)?) => {
        tracing::debug!(cache = %$cache, op = $op $(, $($field)+)?, "<== return")
    };
}

pub(crate) use {cache_invoke, cache_return};
