//! Attribute value serialization.
//!
//! Values with a builtin codec are written as `[0x00][tag][payload]`. Anything
//! else goes through the generic path: the object-stream header followed by the
//! value as JSON. On read, byte 0 tells the two apart.

use attribute_codec::{registry, AttributeValue, CodecError, BUILTIN_SERIALIZATION};

use crate::error::{CacheStoreError, Result};

/// Leading bytes of a generically serialized value.
pub const OBJECT_STREAM_HEADER: [u8; 4] = [0xAC, 0xED, 0x00, 0x05];

pub fn serialize(value: &AttributeValue) -> Result<Vec<u8>> {
    if let Some(bytes) = registry::encode(value)? {
        tracing::trace!(kind = value.type_name(), "serializing with builtin codec");
        return Ok(bytes);
    }

    tracing::trace!("serializing with generic object stream");
    let AttributeValue::Object(object) = value else {
        return Err(CacheStoreError::NoSerializer {
            type_name: value.type_name(),
        });
    };
    let mut out = OBJECT_STREAM_HEADER.to_vec();
    serde_json::to_writer(&mut out, object)
        .map_err(|source| CacheStoreError::ObjectSerialize { source })?;
    Ok(out)
}

pub fn deserialize(bytes: &[u8]) -> Result<AttributeValue> {
    if bytes.starts_with(&OBJECT_STREAM_HEADER) {
        tracing::trace!("deserializing with generic object stream");
        let object = serde_json::from_slice(&bytes[OBJECT_STREAM_HEADER.len()..])
            .map_err(|source| CacheStoreError::ObjectDeserialize { source })?;
        return Ok(AttributeValue::Object(object));
    }

    match bytes.first() {
        Some(&BUILTIN_SERIALIZATION) => {
            tracing::trace!("deserializing with builtin codec");
            registry::decode(bytes).map_err(|error| match error {
                CodecError::UnknownTag { .. } => CacheStoreError::corrupt_stream(bytes),
                other => other.into(),
            })
        }
        _ => Err(CacheStoreError::corrupt_stream(bytes)),
    }
}
