//! Diagnostic renderings of encoded values.

/// Longest prefix rendered by [`limited_bytes_to_string`].
pub const DISPLAY_LIMIT: usize = 32;

/// Hex rendering of at most [`DISPLAY_LIMIT`] leading bytes.
///
/// Longer arrays are cut off and suffixed with their total length, so the output
/// stays bounded no matter how large an attribute gets.
#[must_use]
pub fn limited_bytes_to_string(bytes: &[u8]) -> String {
    if bytes.len() <= DISPLAY_LIMIT {
        return hex::encode(bytes);
    }
    format!(
        "{}... ({} bytes)",
        hex::encode(&bytes[..DISPLAY_LIMIT]),
        bytes.len()
    )
}
