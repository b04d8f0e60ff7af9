//! The block-device abstraction.
//!
//! Sector-size discovery is out of scope for this crate; callers hand in
//! a device that already knows its own [`MediumGeometry`].

use std::io::{self, Read, Seek, SeekFrom, Write};

/// A medium's logical-sector size and total extent.
///
/// `log_sector_size` is the base-2 log of the sector size in bytes
/// (9 for 512, 12 for 4096). `total_sectors` is `None` when the medium's
/// size is not known up front, or when it's implausibly large.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumGeometry {
    /// Base-2 log of the sector size in bytes.
    pub log_sector_size: u32,
    /// Total sector count, or `None` if unknown.
    pub total_sectors: Option<u64>,
}

impl MediumGeometry {
    /// Construct a geometry, normalizing implausibly large sector counts to "unknown".
    pub fn new(log_sector_size: u32, total_sectors: Option<u64>) -> Self {
        let total_sectors = total_sectors.and_then(|n| {
            let shifted = n.checked_shl(log_sector_size.saturating_sub(9));
            match shifted {
                Some(v) if v <= (1u64 << 51) => Some(n),
                _ => None,
            }
        });
        Self {
            log_sector_size,
            total_sectors,
        }
    }

    /// The sector size in bytes.
    pub fn sector_size(&self) -> u64 {
        1u64 << self.log_sector_size
    }

    /// The byte offset of `sector`.
    pub fn byte_offset(&self, sector: u64) -> u64 {
        sector * self.sector_size()
    }
}

/// A device a [`GptHandle`](crate::gpt::GptHandle) reads from and writes to.
pub trait BlockDevice: Read + Write + Seek {
    /// This medium's geometry.
    fn geometry(&self) -> MediumGeometry;
}

/// Read exactly `len` bytes starting at `sector`, at `byte_offset_within_sector`.
pub(crate) fn read_at<D: BlockDevice + ?Sized>(
    device: &mut D,
    sector: u64,
    byte_offset_within_sector: u64,
    buf: &mut [u8],
) -> io::Result<()> {
    let geom = device.geometry();
    let offset = geom.byte_offset(sector) + byte_offset_within_sector;
    device.seek(SeekFrom::Start(offset))?;
    device.read_exact(buf)
}

/// Write `buf` starting at `sector`, at `byte_offset_within_sector`.
pub(crate) fn write_at<D: BlockDevice + ?Sized>(
    device: &mut D,
    sector: u64,
    byte_offset_within_sector: u64,
    buf: &[u8],
) -> io::Result<()> {
    let geom = device.geometry();
    let offset = geom.byte_offset(sector) + byte_offset_within_sector;
    device.seek(SeekFrom::Start(offset))?;
    device.write_all(buf)
}

/// A [`std::io::Cursor`]-backed medium, for tests and in-memory images.
#[derive(Debug)]
pub struct MemoryDevice {
    cursor: io::Cursor<Vec<u8>>,
    geometry: MediumGeometry,
}

impl MemoryDevice {
    /// Wrap `data` as a medium with the given geometry.
    pub fn new(data: Vec<u8>, geometry: MediumGeometry) -> Self {
        Self {
            cursor: io::Cursor::new(data),
            geometry,
        }
    }

    /// Consume the device, returning the underlying bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.cursor.flush()
    }
}

impl Seek for MemoryDevice {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl BlockDevice for MemoryDevice {
    fn geometry(&self) -> MediumGeometry {
        self.geometry
    }
}
