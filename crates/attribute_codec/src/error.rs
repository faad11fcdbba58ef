use thiserror::Error;

use crate::value::BuiltinKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("need {needed} bytes at offset {offset} but only {available} are available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("buffer of {available} bytes cannot hold {needed} bytes")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("variable-length integer does not terminate within {max_bytes} bytes")]
    VarIntOverflow { max_bytes: usize },

    #[error("value does not start with the builtin discriminator (found {discriminator:#04x})")]
    NotBuiltin { discriminator: u8 },

    #[error("corrupt builtin value: unknown type tag {tag}")]
    UnknownTag { tag: u8 },

    #[error("type tag {found} handed to the {expected:?} codec")]
    TagMismatch { expected: BuiltinKind, found: u8 },

    #[error("{found} value handed to the {expected:?} codec")]
    KindMismatch {
        expected: BuiltinKind,
        found: &'static str,
    },

    #[error("negative length prefix {length}")]
    NegativeLength { length: i32 },

    #[error("length {length} does not fit a 4-byte length prefix")]
    LengthOverflow { length: usize },

    #[error("{extra} unexpected trailing bytes after {kind:?} payload")]
    TrailingBytes { kind: BuiltinKind, extra: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;

pub(crate) fn ensure_readable(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let fits = offset
        .checked_add(needed)
        .map_or(false, |end| end <= buf.len());
    if !fits {
        return Err(CodecError::Truncated {
            offset,
            needed,
            available: buf.len().saturating_sub(offset),
        });
    }
    Ok(())
}

pub(crate) fn ensure_writable(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let end = offset.saturating_add(needed);
    if end > buf.len() {
        return Err(CodecError::BufferTooSmall {
            needed: end,
            available: buf.len(),
        });
    }
    Ok(())
}
