//! On-disk record framing.
//!
//! ```text
//! stream := record*
//! record := length:u64 (big-endian) payload:[u8; length]
//! ```
//!
//! There is no magic, version tag or checksum. A position that is the start
//! of a record can always be read back from the header alone.

/// Width of the length header in bytes.
pub const LEN_WIDTH: u64 = 8;

/// Encode the length header for a payload of `len` bytes.
pub fn encode_header(len: u64) -> [u8; LEN_WIDTH as usize] {
    len.to_be_bytes()
}

/// Decode a length header.
pub fn decode_header(header: [u8; LEN_WIDTH as usize]) -> u64 {
    u64::from_be_bytes(header)
}

/// Total on-disk size of a record carrying `payload_len` bytes.
pub fn framed_len(payload_len: u64) -> u64 {
    LEN_WIDTH + payload_len
}
