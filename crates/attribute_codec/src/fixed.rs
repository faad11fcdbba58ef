//! Big-endian fixed-width primitives.

use crate::error::{ensure_readable, ensure_writable, Result};

pub const SHORT_BYTES: usize = 2;
pub const CHAR_BYTES: usize = 2;
pub const INT_BYTES: usize = 4;
pub const LONG_BYTES: usize = 8;

pub fn short_to_bytes(value: i16, buf: &mut [u8], offset: usize) -> Result<()> {
    put(&value.to_be_bytes(), buf, offset)
}

pub fn bytes_to_short(buf: &[u8], offset: usize) -> Result<i16> {
    Ok(i16::from_be_bytes(take(buf, offset)?))
}

/// Characters are UTF-16 code units.
pub fn char_to_bytes(value: u16, buf: &mut [u8], offset: usize) -> Result<()> {
    put(&value.to_be_bytes(), buf, offset)
}

pub fn bytes_to_char(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(u16::from_be_bytes(take(buf, offset)?))
}

pub fn int_to_bytes(value: i32, buf: &mut [u8], offset: usize) -> Result<()> {
    put(&value.to_be_bytes(), buf, offset)
}

pub fn bytes_to_int(buf: &[u8], offset: usize) -> Result<i32> {
    Ok(i32::from_be_bytes(take(buf, offset)?))
}

pub fn long_to_bytes(value: i64, buf: &mut [u8], offset: usize) -> Result<()> {
    put(&value.to_be_bytes(), buf, offset)
}

pub fn bytes_to_long(buf: &[u8], offset: usize) -> Result<i64> {
    Ok(i64::from_be_bytes(take(buf, offset)?))
}

fn put(bytes: &[u8], buf: &mut [u8], offset: usize) -> Result<()> {
    ensure_writable(buf, offset, bytes.len())?;
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    ensure_readable(buf, offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    #[test]
    fn layouts_are_big_endian() {
        let mut buf = [0u8; 8];
        short_to_bytes(0x1234, &mut buf, 0).expect("short fits");
        assert_eq!(&buf[..2], &[0x12, 0x34]);

        int_to_bytes(-2, &mut buf, 0).expect("int fits");
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xFF, 0xFE]);

        long_to_bytes(0x0102_0304_0506_0708, &mut buf, 0).expect("long fits");
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn reads_back_at_offset() {
        let mut buf = [0u8; 12];
        char_to_bytes(0xFFFF, &mut buf, 1).expect("char fits");
        long_to_bytes(i64::MIN, &mut buf, 3).expect("long fits");

        assert_eq!(bytes_to_char(&buf, 1), Ok(0xFFFF));
        assert_eq!(bytes_to_long(&buf, 3), Ok(i64::MIN));
        assert_eq!(bytes_to_short(&buf, 1), Ok(-1));
    }

    #[test]
    fn short_reads_report_truncation() {
        let buf = [0u8; 3];
        assert_eq!(
            bytes_to_int(&buf, 1),
            Err(CodecError::Truncated {
                offset: 1,
                needed: 4,
                available: 2
            })
        );
    }
}
