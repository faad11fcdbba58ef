use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("failed to parse {record} row: {source}")]
    RowParse {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {record} row: {source}")]
    RowSerialize {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed single-row key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("property id '{property_id}' collides with its session id")]
    PropertyIdIsSessionId { property_id: String },
}

impl SessionStoreError {
    #[must_use]
    pub fn row_parse(record: &'static str, source: serde_json::Error) -> Self {
        Self::RowParse { record, source }
    }

    #[must_use]
    pub fn row_serialize(record: &'static str, source: serde_json::Error) -> Self {
        Self::RowSerialize { record, source }
    }

    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }
}
