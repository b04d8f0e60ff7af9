//! Shared synthetic-image builder for the integration tests.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crc::{Crc, CRC_32_ISO_HDLC};
use gpt_core::{BlockDevice, MediumGeometry};
use uuid::Uuid;

pub const SECTOR: u64 = 512;
pub const TOTAL_SECTORS: u64 = 2048;
pub const MAXPART: u32 = 128;
pub const PARTENTRY_SIZE: u32 = 128;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn crc32(bytes: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(bytes);
    digest.finalize()
}

fn guid_bytes(guid: &Uuid) -> [u8; 16] {
    let (d1, d2, d3, d4) = guid.as_fields();
    let mut out = [0u8; 16];
    out[0..4].copy_from_slice(&d1.to_le_bytes());
    out[4..6].copy_from_slice(&d2.to_le_bytes());
    out[6..8].copy_from_slice(&d3.to_le_bytes());
    out[8..16].copy_from_slice(d4);
    out
}

/// The wire fields of one GPT header copy.
pub struct HeaderFields {
    pub header_lba: u64,
    pub alternate_lba: u64,
    pub partitions_lba: u64,
    pub first_usable: u64,
    pub last_usable: u64,
    pub guid: Uuid,
    pub partentry_crc32: u32,
}

fn header_bytes(f: &HeaderFields) -> [u8; 92] {
    let mut buf = [0u8; 92];
    buf[0..8].copy_from_slice(b"EFI PART");
    buf[8..12].copy_from_slice(&0x0001_0000u32.to_le_bytes());
    buf[12..16].copy_from_slice(&92u32.to_le_bytes());
    // crc32 at [16..20] left zero for the CRC pass.
    buf[24..32].copy_from_slice(&f.header_lba.to_le_bytes());
    buf[32..40].copy_from_slice(&f.alternate_lba.to_le_bytes());
    buf[40..48].copy_from_slice(&f.first_usable.to_le_bytes());
    buf[48..56].copy_from_slice(&f.last_usable.to_le_bytes());
    buf[56..72].copy_from_slice(&guid_bytes(&f.guid));
    buf[72..80].copy_from_slice(&f.partitions_lba.to_le_bytes());
    buf[80..84].copy_from_slice(&MAXPART.to_le_bytes());
    buf[84..88].copy_from_slice(&PARTENTRY_SIZE.to_le_bytes());
    buf[88..92].copy_from_slice(&f.partentry_crc32.to_le_bytes());
    let crc = crc32(&buf);
    buf[16..20].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn entry_bytes(type_guid: &Uuid, part_guid: &Uuid, first_lba: u64, last_lba: u64, name: &str) -> [u8; 128] {
    let mut buf = [0u8; 128];
    buf[0..16].copy_from_slice(&guid_bytes(type_guid));
    buf[16..32].copy_from_slice(&guid_bytes(part_guid));
    buf[32..40].copy_from_slice(&first_lba.to_le_bytes());
    buf[40..48].copy_from_slice(&last_lba.to_le_bytes());
    for (i, c) in name.encode_utf16().enumerate() {
        let off = 56 + i * 2;
        buf[off..off + 2].copy_from_slice(&c.to_le_bytes());
    }
    buf
}

/// Build a clean, fully-consistent single-partition GPT image.
pub fn build_image() -> Vec<u8> {
    let mut data = vec![0u8; (TOTAL_SECTORS * SECTOR) as usize];

    // Protective MBR.
    let pmbr_off = 446usize;
    data[pmbr_off + 4] = 0xEE;
    data[pmbr_off + 8..pmbr_off + 12].copy_from_slice(&1u32.to_le_bytes());
    data[pmbr_off + 12..pmbr_off + 16].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    data[510] = 0x55;
    data[511] = 0xAA;

    let disk_guid: Uuid = "1B6A2BFA-E92B-184C-A8A7-ED0610D54821".parse().unwrap();
    let type_guid: Uuid = "0FC63DAF-8483-4772-8E79-3D69D8477DE4".parse().unwrap();
    let part_guid: Uuid = "44206F92-FD69-4F8A-9F02-D0E69CF6FE54".parse().unwrap();

    let mut entries = vec![0u8; (MAXPART * PARTENTRY_SIZE) as usize];
    entries[0..128].copy_from_slice(&entry_bytes(&type_guid, &part_guid, 40, 2000, "root"));
    let entries_crc = crc32(&entries);

    let primary = HeaderFields {
        header_lba: 1,
        alternate_lba: TOTAL_SECTORS - 1,
        partitions_lba: 2,
        first_usable: 34,
        last_usable: 2014,
        guid: disk_guid,
        partentry_crc32: entries_crc,
    };
    let backup = HeaderFields {
        header_lba: TOTAL_SECTORS - 1,
        alternate_lba: 1,
        partitions_lba: TOTAL_SECTORS - 1 - 32,
        first_usable: 34,
        last_usable: 2014,
        guid: disk_guid,
        partentry_crc32: entries_crc,
    };

    let primary_bytes = header_bytes(&primary);
    let backup_bytes = header_bytes(&backup);

    data[SECTOR as usize..SECTOR as usize + 92].copy_from_slice(&primary_bytes);
    let backup_off = (backup.header_lba * SECTOR) as usize;
    data[backup_off..backup_off + 92].copy_from_slice(&backup_bytes);

    let primary_entries_off = (primary.partitions_lba * SECTOR) as usize;
    data[primary_entries_off..primary_entries_off + entries.len()].copy_from_slice(&entries);
    let backup_entries_off = (backup.partitions_lba * SECTOR) as usize;
    data[backup_entries_off..backup_entries_off + entries.len()].copy_from_slice(&entries);

    data
}

/// A [`std::fs::File`]-backed medium, for tests that exercise real I/O.
pub struct FileDevice {
    file: File,
    geometry: MediumGeometry,
}

impl FileDevice {
    pub fn new(file: File, geometry: MediumGeometry) -> Self {
        Self { file, geometry }
    }
}

impl Read for FileDevice {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileDevice {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileDevice {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

impl BlockDevice for FileDevice {
    fn geometry(&self) -> MediumGeometry {
        self.geometry
    }
}
