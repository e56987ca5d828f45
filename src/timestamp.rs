//! Packed timestamp codec
//!
//! The timestamp block following the time marker is 6 bytes long. The first
//! five bytes hold a little-endian Unix timestamp spread over 7 bits per
//! byte: the most significant bit of each of the first four bytes is always
//! set and carries no value, and the low 4 bits of the fifth byte complete
//! the 32nd bit. The sixth byte is unused (observed constant `0x03`).

use byteorder::{ByteOrder, LittleEndian};

/// Number of bytes that contribute to the decoded value
pub const PACKED_LEN: usize = 5;

/// Trailing byte observed in every block
const RESERVED_BYTE: u8 = 0x03;

/// Decode 5 packed bytes into a Unix timestamp (seconds since epoch)
///
/// Output byte `i` is the input byte `i` shifted right by `i` with its high
/// bit dropped, joined with the low `i + 1` bits of input byte `i + 1`.
pub fn decode_timestamp(packed: &[u8; PACKED_LEN]) -> i32 {
    let mut out = [0u8; 4];
    for i in 0..4 {
        let low = (packed[i] >> i) & (0x7Fu8 >> i);
        let high = packed[i + 1] << (7 - i);
        out[i] = low | high;
    }
    LittleEndian::read_i32(&out)
}

/// Decode the timestamp from a time block slice
///
/// Only the first [`PACKED_LEN`] bytes are read. Returns `None` when the
/// slice is too short.
pub fn decode_time_block(block: &[u8]) -> Option<i32> {
    let packed: &[u8; PACKED_LEN] = block.get(..PACKED_LEN)?.try_into().ok()?;
    Some(decode_timestamp(packed))
}

/// Encode a Unix timestamp into the 6-byte on-disk block
pub fn encode_timestamp(timestamp: i32) -> [u8; 6] {
    let value = timestamp as u32;
    let mut block = [0u8; 6];
    for (i, byte) in block.iter_mut().take(4).enumerate() {
        *byte = ((value >> (7 * i)) & 0x7F) as u8 | 0x80;
    }
    block[4] = ((value >> 28) & 0x0F) as u8;
    block[5] = RESERVED_BYTE;
    block
}
