//! The CRC-32 engine.
//!
//! Wraps the `crc` crate's CRC-32/ISO-HDLC implementation (the GPT
//! variant) and always hands back a value that compares byte-for-byte
//! against the little-endian on-medium field. `crc::Crc<u32>::finalize`
//! already returns the checksum as a native `u32`; the only byte-order
//! responsibility left to callers is writing it out with `to_le_bytes`,
//! which the header and entry-array codecs do.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC_32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the GPT CRC-32 of `bytes`.
pub(crate) fn crc32(bytes: &[u8]) -> u32 {
    let mut digest = CRC_32.digest();
    digest.update(bytes);
    digest.finalize()
}
