//! Checksum verification for the checksummed frame layout.
//!
//! The checksum block is the little-endian xxHash64 (seed 0) of the data
//! bytes. Verification sits on top of the framer: a frame with no checksum
//! block passes through untouched.

use qf_core::error::DecodeError;

use crate::framer::RawFrame;

/// Checksum bytes for `data`.
#[inline]
pub fn checksum_of(data: &[u8]) -> [u8; 8] {
    xxhash_rust::xxh64::xxh64(data, 0).to_le_bytes()
}

/// Verify a frame's checksum block, if it has one.
pub fn verify(frame: &RawFrame) -> Result<(), DecodeError> {
    match frame.checksum {
        None => Ok(()),
        Some(ref ck) if ck.as_slice() == checksum_of(&frame.data) => Ok(()),
        Some(_) => Err(DecodeError::ChecksumMismatch),
    }
}
