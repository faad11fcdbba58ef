use attribute_codec::CodecError;
use session_store::SessionStoreError;
use thiserror::Error;

/// Failures raised by a cache provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("cache '{name}' holds different key or value types")]
    TypeMismatch { name: String },

    #[error("cache manager is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Record(#[from] SessionStoreError),

    #[error("cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("cache already contains session {id}")]
    DuplicateSession { id: String },

    #[error("invalid stream header: {header}")]
    CorruptStream { header: String },

    #[error("no serializer accepts {type_name} values")]
    NoSerializer { type_name: &'static str },

    #[error("failed to serialize attribute object: {source}")]
    ObjectSerialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to deserialize attribute object: {source}")]
    ObjectDeserialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt attribute blob: {reason}")]
    CorruptAttributes { reason: &'static str },

    #[error("failed to initialize cache '{name}': {source}")]
    CacheInit {
        name: String,
        #[source]
        source: CacheError,
    },

    #[error(
        "failed to create cache manager for {}: {source}",
        .uri.as_deref().unwrap_or("the default configuration")
    )]
    ManagerInit {
        uri: Option<String>,
        #[source]
        source: CacheError,
    },

    #[error("no cache manager is available")]
    NoCacheManager,
}

impl CacheStoreError {
    /// Renders the first two bytes as signed values, `<none>` where absent.
    #[must_use]
    pub fn corrupt_stream(bytes: &[u8]) -> Self {
        let render = |index: usize| {
            bytes
                .get(index)
                .map_or_else(|| "<none>".to_owned(), |byte| (*byte as i8).to_string())
        };
        Self::CorruptStream {
            header: format!("{} {}", render(0), render(1)),
        }
    }

    #[must_use]
    pub fn cache_init(name: impl Into<String>, source: CacheError) -> Self {
        Self::CacheInit {
            name: name.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheStoreError>;
