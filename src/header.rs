//! GPT header codec and validation.

use simple_bytes::{Bytes, BytesArray, BytesRead, BytesWrite};
use uuid::Uuid;

use crate::crc::crc32;
use crate::error::{GptError, GptErrorKind, Result};
use crate::guid::{guid_to_bytes, read_guid};

/// The only header size this crate reads the CRC over and ever writes.
pub const HEADER_SIZE: u32 = 92;
/// Exact 8-byte magic, `"EFI PART"`.
pub const SIGNATURE: [u8; 8] = *b"EFI PART";
/// Exact required header version.
pub const VERSION: u32 = 0x0001_0000;
/// Minimum entry-array size in bytes.
pub const MIN_ENTRIES_BYTES: u64 = 16_384;

/// A GPT header, either the primary or the backup copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// The 8-byte `"EFI PART"` signature.
    pub magic: [u8; 8],
    /// The header revision; this crate only accepts [`VERSION`].
    pub version: u32,
    /// The header's on-medium size in bytes, at least 92.
    pub headersize: u32,
    /// This header's own CRC-32, computed with this field zeroed.
    pub crc32: u32,
    /// Reserved; always zero.
    pub reserved: u32,
    /// The LBA this header itself lives at.
    pub header_lba: u64,
    /// The LBA of the other (primary/backup) header.
    pub alternate_lba: u64,
    /// First LBA usable by partitions.
    pub first_usable: u64,
    /// Last LBA usable by partitions.
    pub last_usable: u64,
    /// This disk's GUID.
    pub guid: Uuid,
    /// The LBA the entry array starts at.
    pub partitions_lba: u64,
    /// Number of entry slots in the entry array.
    pub maxpart: u32,
    /// Size in bytes of a single entry slot.
    pub partentry_size: u32,
    /// CRC-32 of the entire entry array.
    pub partentry_crc32: u32,
}

impl Header {
    /// Deserialize a header from (at least) the first 92 bytes of a sector.
    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(GptError::new(
                GptErrorKind::BadPartTable,
                "header buffer shorter than 92 bytes",
            ));
        }
        let mut bytes = Bytes::from(buf);
        let mut magic = [0u8; 8];
        BytesRead::read(&mut bytes, 8)
            .iter()
            .enumerate()
            .for_each(|(i, b)| magic[i] = *b);
        Ok(Header {
            magic,
            version: bytes.read_le_u32(),
            headersize: bytes.read_le_u32(),
            crc32: bytes.read_le_u32(),
            reserved: bytes.read_le_u32(),
            header_lba: bytes.read_le_u64(),
            alternate_lba: bytes.read_le_u64(),
            first_usable: bytes.read_le_u64(),
            last_usable: bytes.read_le_u64(),
            guid: read_guid(BytesRead::read(&mut bytes, 16).try_into().unwrap()),
            partitions_lba: bytes.read_le_u64(),
            maxpart: bytes.read_le_u32(),
            partentry_size: bytes.read_le_u32(),
            partentry_crc32: bytes.read_le_u32(),
        })
    }

    /// Serialize the header to its native 92-byte on-medium layout.
    /// When `zero_crc` is set, the `crc32` field is written as zero
    /// (used to recompute the header's own CRC).
    pub(crate) fn to_bytes(&self, zero_crc: bool) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = BytesArray::from([0u8; HEADER_SIZE as usize]);
        BytesWrite::write(&mut bytes, self.magic);
        bytes.write_le_u32(self.version);
        bytes.write_le_u32(self.headersize);
        bytes.write_le_u32(if zero_crc { 0 } else { self.crc32 });
        bytes.write_le_u32(0); // reserved, always zero on write
        bytes.write_le_u64(self.header_lba);
        bytes.write_le_u64(self.alternate_lba);
        bytes.write_le_u64(self.first_usable);
        bytes.write_le_u64(self.last_usable);
        BytesWrite::write(&mut bytes, guid_to_bytes(&self.guid));
        bytes.write_le_u64(self.partitions_lba);
        bytes.write_le_u32(self.maxpart);
        bytes.write_le_u32(self.partentry_size);
        bytes.write_le_u32(self.partentry_crc32);
        bytes.into_array()
    }

    /// Recompute this header's own CRC-32 (with the field zeroed first).
    pub(crate) fn compute_crc32(&self) -> u32 {
        crc32(&self.to_bytes(true))
    }

    /// `entries_size = maxpart * partentry_size`, checked for overflow.
    pub(crate) fn entries_size(&self) -> Result<u64> {
        let maxpart = self.maxpart as u64;
        let partentry_size = self.partentry_size as u64;
        let product = maxpart
            .checked_mul(partentry_size)
            .ok_or_else(|| GptError::new(GptErrorKind::OutOfMemory, "maxpart * partentry_size overflows"))?;
        // Belt-and-braces inverse check alongside checked_mul.
        if partentry_size != 0 && product / partentry_size != maxpart {
            return Err(GptError::new(
                GptErrorKind::OutOfMemory,
                "maxpart * partentry_size overflows",
            ));
        }
        if product < MIN_ENTRIES_BYTES {
            return Err(GptError::new(
                GptErrorKind::BadPartTable,
                "entry array smaller than 16384 bytes",
            ));
        }
        Ok(product)
    }
}

pub(crate) fn ceil_div(lhs: u64, rhs: u64) -> u64 {
    (lhs + rhs - 1) / rhs
}

/// Generic header checks shared by primary and backup: signature,
/// version, CRC-32, header size, entry geometry, and usable-range order.
pub(crate) fn header_check(header: &Header, log_sector_size: u32) -> Result<()> {
    if header.magic != SIGNATURE {
        return Err(GptError::new(GptErrorKind::BadPartTable, "bad GPT signature"));
    }
    if header.version != VERSION {
        return Err(GptError::new(GptErrorKind::BadPartTable, "unsupported GPT version"));
    }
    let computed = header.compute_crc32();
    if computed != header.crc32 {
        return Err(GptError::new(GptErrorKind::BadPartTable, "header CRC32 mismatch"));
    }
    let sector_size = 1u64 << log_sector_size;
    if (header.headersize as u64) < 92 || (header.headersize as u64) > sector_size {
        return Err(GptError::new(GptErrorKind::BadPartTable, "header size out of range"));
    }
    if header.partentry_size < 128 || header.partentry_size % 128 != 0 {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "partition entry size must be a multiple of 128",
        ));
    }
    if !(header.partentry_size / 128).is_power_of_two() {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "partition entry size must be 128 times a power of two",
        ));
    }
    header.entries_size()?;
    if header.first_usable > header.last_usable {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "first_usable beyond last_usable",
        ));
    }
    Ok(())
}

/// Primary-specific sanity checks, layered on top of [`header_check`].
pub(crate) fn check_primary(header: &Header, log_sector_size: u32) -> Result<()> {
    header_check(header, log_sector_size)?;
    if header.header_lba != 1 {
        return Err(GptError::new(GptErrorKind::BadPartTable, "primary header_lba != 1"));
    }
    if header.partitions_lba <= 1 {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "primary partitions_lba must be > 1",
        ));
    }
    let sector_size = 1u64 << log_sector_size;
    let entries_sectors = ceil_div(header.entries_size()?, sector_size);
    if header.partitions_lba + entries_sectors > header.first_usable {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "primary entry array overruns first_usable",
        ));
    }
    if header.alternate_lba <= header.last_usable {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "primary alternate_lba not beyond last_usable",
        ));
    }
    Ok(())
}

/// Backup-specific sanity checks, layered on top of [`header_check`].
pub(crate) fn check_backup(header: &Header, log_sector_size: u32) -> Result<()> {
    header_check(header, log_sector_size)?;
    if header.alternate_lba != 1 {
        return Err(GptError::new(GptErrorKind::BadPartTable, "backup alternate_lba != 1"));
    }
    if header.partitions_lba <= header.last_usable {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "backup partitions_lba not beyond last_usable",
        ));
    }
    let sector_size = 1u64 << log_sector_size;
    let entries_sectors = ceil_div(header.entries_size()?, sector_size);
    if header.partitions_lba + entries_sectors > header.header_lba {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "backup entry array overruns its own header",
        ));
    }
    if header.header_lba <= header.last_usable {
        return Err(GptError::new(
            GptErrorKind::BadPartTable,
            "backup header_lba not beyond last_usable",
        ));
    }
    Ok(())
}

/// Whether a validated primary and a validated backup agree on every
/// field that must mirror across both copies.
pub(crate) fn mirror_consistent(primary: &Header, backup: &Header) -> bool {
    primary.headersize == backup.headersize
        && primary.header_lba == backup.alternate_lba
        && primary.alternate_lba == backup.header_lba
        && primary.first_usable == backup.first_usable
        && primary.last_usable == backup.last_usable
        && primary.maxpart == backup.maxpart
        && primary.partentry_size == backup.partentry_size
        && primary.partentry_crc32 == backup.partentry_crc32
        && primary.guid == backup.guid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pair() -> (Header, Header) {
        let guid: Uuid = "1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap();
        let primary = Header {
            magic: SIGNATURE,
            version: VERSION,
            headersize: HEADER_SIZE,
            crc32: 0,
            reserved: 0,
            header_lba: 1,
            alternate_lba: 2047,
            first_usable: 34,
            last_usable: 2014,
            guid,
            partitions_lba: 2,
            maxpart: 128,
            partentry_size: 128,
            partentry_crc32: 0,
        };
        let backup = Header {
            header_lba: 2047,
            alternate_lba: 1,
            partitions_lba: 2015,
            ..primary.clone()
        };
        (primary, backup)
    }

    #[test]
    fn round_trips_bytes() {
        let (mut primary, _) = sample_pair();
        primary.crc32 = primary.compute_crc32();
        let bytes = primary.to_bytes(false);
        let parsed = Header::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, primary);
    }

    #[test]
    fn header_check_accepts_valid_header() {
        let (mut primary, _) = sample_pair();
        primary.crc32 = primary.compute_crc32();
        assert!(header_check(&primary, 9).is_ok());
    }

    #[test]
    fn header_check_rejects_bad_magic() {
        let (mut primary, _) = sample_pair();
        primary.magic = *b"NOT GPT!";
        primary.crc32 = primary.compute_crc32();
        assert_eq!(
            header_check(&primary, 9).unwrap_err().kind(),
            GptErrorKind::BadPartTable
        );
    }

    #[test]
    fn primary_and_backup_are_mirror_consistent() {
        let (mut primary, mut backup) = sample_pair();
        primary.crc32 = primary.compute_crc32();
        backup.crc32 = backup.compute_crc32();
        assert!(check_primary(&primary, 9).is_ok());
        assert!(check_backup(&backup, 9).is_ok());
        assert!(mirror_consistent(&primary, &backup));
    }
}
