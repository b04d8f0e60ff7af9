//! Partition entry-array codec.

use simple_bytes::BytesRead;
use uuid::Uuid;

use crate::crc::crc32;
use crate::error::{GptError, GptErrorKind, Result};
use crate::guid::read_guid;
#[cfg(test)]
use crate::guid::guid_to_bytes;
use crate::header::Header;

/// The first 128 specified bytes of a partition entry; `partentry_size`
/// may reserve more, which this crate treats as opaque padding.
pub const ENTRY_SPECIFIED_SIZE: usize = 128;
const NAME_UTF16_UNITS: usize = 36;

/// A single partition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The partition type GUID; nil means the slot is unused.
    pub type_guid: Uuid,
    /// This partition's own unique GUID.
    pub part_guid: Uuid,
    /// First LBA occupied by this partition.
    pub first_lba: u64,
    /// Last LBA occupied by this partition.
    pub last_lba: u64,
    /// Type-specific attribute bits.
    pub attributes: u64,
    name_units: [u16; NAME_UTF16_UNITS],
}

impl Entry {
    /// Whether this slot is used (a non-zero type GUID).
    pub fn is_used(&self) -> bool {
        !self.type_guid.is_nil()
    }

    /// Decode the 72-byte UTF-16LE name into UTF-8.
    pub fn name(&self) -> String {
        let end = self
            .name_units
            .iter()
            .position(|&u| u == 0)
            .unwrap_or(NAME_UTF16_UNITS);
        char::decode_utf16(self.name_units[..end].iter().copied())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    fn parse(bytes: &[u8]) -> Entry {
        let mut cursor = simple_bytes::Bytes::from(bytes);
        let type_guid = read_guid(BytesRead::read(&mut cursor, 16).try_into().unwrap());
        let part_guid = read_guid(BytesRead::read(&mut cursor, 16).try_into().unwrap());
        let first_lba = cursor.read_le_u64();
        let last_lba = cursor.read_le_u64();
        let attributes = cursor.read_le_u64();
        let mut name_units = [0u16; NAME_UTF16_UNITS];
        for slot in name_units.iter_mut() {
            *slot = cursor.read_le_u16();
        }
        Entry {
            type_guid,
            part_guid,
            first_lba,
            last_lba,
            attributes,
            name_units,
        }
    }
}

/// The owned entry-array buffer plus the geometry needed to index it.
#[derive(Debug, Clone)]
pub struct EntryArray {
    buf: Vec<u8>,
    maxpart: u32,
    partentry_size: u32,
}

impl EntryArray {
    /// Read and CRC-check the entry array described by `header`.
    ///
    /// `raw` must be exactly `header.entries_size()` bytes, already read
    /// from `header.partitions_lba`.
    pub(crate) fn from_raw(header: &Header, raw: Vec<u8>) -> Result<EntryArray> {
        let expected_crc = header.partentry_crc32;
        if crc32(&raw) != expected_crc {
            return Err(GptError::new(
                GptErrorKind::BadPartTable,
                "partition entry array CRC32 mismatch",
            ));
        }
        Ok(EntryArray {
            buf: raw,
            maxpart: header.maxpart,
            partentry_size: header.partentry_size,
        })
    }

    /// Build an entry array straight from raw bytes without CRC-checking
    /// it against a header; used by tests to assemble synthetic images.
    #[cfg(test)]
    pub(crate) fn from_buf_unchecked(buf: Vec<u8>, maxpart: u32, partentry_size: u32) -> EntryArray {
        EntryArray {
            buf,
            maxpart,
            partentry_size,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn crc32(&self) -> u32 {
        crc32(&self.buf)
    }

    /// The entry at index `n`, or `None` if `n >= maxpart`.
    pub fn entry(&self, n: u32) -> Option<Entry> {
        if n >= self.maxpart {
            return None;
        }
        let start = n as usize * self.partentry_size as usize;
        let end = start + ENTRY_SPECIFIED_SIZE;
        self.buf.get(start..end).map(Entry::parse)
    }

    /// Number of slots in the array (used and unused).
    pub fn len(&self) -> u32 {
        self.maxpart
    }

    /// Whether the array has zero slots.
    pub fn is_empty(&self) -> bool {
        self.maxpart == 0
    }

    /// Iterate over every slot, used or not.
    pub fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        (0..self.maxpart).filter_map(|n| self.entry(n))
    }

    /// Overwrite slot `n`'s first 128 bytes (used by tests that build a
    /// synthetic table); leaves any padding bytes untouched.
    #[cfg(test)]
    pub(crate) fn set_entry(&mut self, n: u32, entry: &Entry) {
        let start = n as usize * self.partentry_size as usize;
        self.buf[start..start + 16].copy_from_slice(&guid_to_bytes(&entry.type_guid));
        self.buf[start + 16..start + 32].copy_from_slice(&guid_to_bytes(&entry.part_guid));
        self.buf[start + 32..start + 40].copy_from_slice(&entry.first_lba.to_le_bytes());
        self.buf[start + 40..start + 48].copy_from_slice(&entry.last_lba.to_le_bytes());
        self.buf[start + 48..start + 56].copy_from_slice(&entry.attributes.to_le_bytes());
        for (i, &unit) in entry.name_units.iter().enumerate() {
            let off = start + 56 + i * 2;
            self.buf[off..off + 2].copy_from_slice(&unit.to_le_bytes());
        }
    }
}

#[cfg(test)]
impl Entry {
    /// Build an `Entry` directly, for tests outside this module.
    pub(crate) fn for_test(
        type_guid: Uuid,
        part_guid: Uuid,
        first_lba: u64,
        last_lba: u64,
        attributes: u64,
        name_units: [u16; NAME_UTF16_UNITS],
    ) -> Entry {
        Entry {
            type_guid,
            part_guid,
            first_lba,
            last_lba,
            attributes,
            name_units,
        }
    }
}
