//! LEB128-style variable-length integers.
//!
//! Values are written over their unsigned reinterpretation, low 7 bits first,
//! with the high bit of each byte set while more bytes follow. Negative values
//! therefore always take the full width (5 bytes for `i32`, 10 for `i64`).
//!
//! Decoding is strict for both widths: a value that does not terminate within
//! the maximum byte count, or whose final byte carries bits beyond the target
//! width, is rejected with [`CodecError::VarIntOverflow`].

use crate::error::{ensure_readable, ensure_writable, CodecError, Result};

pub const MAX_INT_VAR_INT_BYTES: usize = 5;
pub const MAX_LONG_VAR_INT_BYTES: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

/// Number of bytes `value` occupies once encoded.
#[must_use]
pub fn int_var_int_len(value: i32) -> usize {
    unsigned_len(u64::from(value as u32))
}

/// Number of bytes `value` occupies once encoded.
#[must_use]
pub fn long_var_int_len(value: i64) -> usize {
    unsigned_len(value as u64)
}

fn unsigned_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Writes `value` at `offset` and returns the number of bytes written.
pub fn write_int_as_var_int_bytes(value: i32, buf: &mut [u8], offset: usize) -> Result<usize> {
    write_unsigned(u64::from(value as u32), buf, offset)
}

/// Writes `value` at `offset` and returns the number of bytes written.
pub fn write_long_as_var_int_bytes(value: i64, buf: &mut [u8], offset: usize) -> Result<usize> {
    write_unsigned(value as u64, buf, offset)
}

fn write_unsigned(mut value: u64, buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_writable(buf, offset, unsigned_len(value))?;

    let mut cursor = offset;
    while value & !u64::from(PAYLOAD_MASK) != 0 {
        buf[cursor] = (value as u8 & PAYLOAD_MASK) | CONTINUATION;
        value >>= 7;
        cursor += 1;
    }
    buf[cursor] = value as u8;
    Ok(cursor + 1 - offset)
}

/// Appends the encoding of `value` to `out`.
pub fn push_int_var_int(value: i32, out: &mut Vec<u8>) {
    let mut scratch = [0u8; MAX_INT_VAR_INT_BYTES];
    let written = write_unsigned(u64::from(value as u32), &mut scratch, 0)
        .unwrap_or(MAX_INT_VAR_INT_BYTES);
    out.extend_from_slice(&scratch[..written]);
}

/// Appends the encoding of `value` to `out`.
pub fn push_long_var_int(value: i64, out: &mut Vec<u8>) {
    let mut scratch = [0u8; MAX_LONG_VAR_INT_BYTES];
    let written = write_unsigned(value as u64, &mut scratch, 0).unwrap_or(MAX_LONG_VAR_INT_BYTES);
    out.extend_from_slice(&scratch[..written]);
}

pub fn var_int_bytes_to_int(buf: &[u8], offset: usize) -> Result<i32> {
    decode_int_var_int(buf, offset).map(|(value, _)| value)
}

pub fn var_int_bytes_to_long(buf: &[u8], offset: usize) -> Result<i64> {
    decode_long_var_int(buf, offset).map(|(value, _)| value)
}

/// Decodes an `i32` at `offset`, returning the value and the bytes consumed.
pub fn decode_int_var_int(buf: &[u8], offset: usize) -> Result<(i32, usize)> {
    // The fifth byte may only carry bits 28..=31.
    let (value, consumed) = decode_unsigned(buf, offset, MAX_INT_VAR_INT_BYTES, 0x0F)?;
    Ok((value as u32 as i32, consumed))
}

/// Decodes an `i64` at `offset`, returning the value and the bytes consumed.
pub fn decode_long_var_int(buf: &[u8], offset: usize) -> Result<(i64, usize)> {
    // The tenth byte may only carry bit 63.
    let (value, consumed) = decode_unsigned(buf, offset, MAX_LONG_VAR_INT_BYTES, 0x01)?;
    Ok((value as i64, consumed))
}

fn decode_unsigned(
    buf: &[u8],
    offset: usize,
    max_bytes: usize,
    last_byte_mask: u8,
) -> Result<(u64, usize)> {
    let mut result = 0u64;
    for index in 0..max_bytes {
        ensure_readable(buf, offset + index, 1)?;
        let byte = buf[offset + index];

        if index == max_bytes - 1 && byte & !last_byte_mask != 0 {
            return Err(CodecError::VarIntOverflow { max_bytes });
        }

        result |= u64::from(byte & PAYLOAD_MASK) << (7 * index);
        if byte & CONTINUATION == 0 {
            return Ok((result, index + 1));
        }
    }

    Err(CodecError::VarIntOverflow { max_bytes })
}
