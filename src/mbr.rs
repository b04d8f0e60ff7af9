//! Protective MBR.
//!
//! Read-only: this crate never writes sector 0, so no
//! `overwrite_lba0`/`update_conservative` analog exists here.

use std::io::{self, Read};

/// A legacy-format partition record, MBR-style (16 bytes).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PartRecord {
    /// Legacy boot indicator byte.
    pub boot_indicator: u8,
    /// Starting cylinder/head/sector, legacy encoding.
    pub start_chs: [u8; 3],
    /// The legacy partition type byte; `0xEE` marks a protective entry.
    pub os_type: u8,
    /// Ending cylinder/head/sector, legacy encoding.
    pub end_chs: [u8; 3],
    /// Starting LBA.
    pub lb_start: u32,
    /// Size in sectors.
    pub lb_size: u32,
}

/// Partition type byte marking a protective entry (GPT-protective).
pub const PROTECTIVE_OS_TYPE: u8 = 0xEE;

impl PartRecord {
    fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf)?;
        Ok(Self {
            boot_indicator: buf[0],
            start_chs: [buf[1], buf[2], buf[3]],
            os_type: buf[4],
            end_chs: [buf[5], buf[6], buf[7]],
            lb_start: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            lb_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

/// A protective MBR, as read from sector 0.
#[derive(Debug, Clone)]
pub struct ProtectiveMbr {
    /// The four legacy partition-table slots.
    pub partitions: [PartRecord; 4],
}

impl ProtectiveMbr {
    /// Parse and validate a 512-byte sector-0 block.
    ///
    /// Fails unless the 0xAA55 signature is present at the last two
    /// bytes and at least one entry carries partition type 0xEE.
    pub(crate) fn parse(sector: &[u8]) -> io::Result<Self> {
        if sector.len() < 512 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "PMBR sector shorter than 512 bytes",
            ));
        }
        if sector[510] != 0x55 || sector[511] != 0xAA {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "missing 0xAA55 MBR signature",
            ));
        }

        let mut reader = &sector[446..510];
        let partitions = [
            PartRecord::read(&mut reader)?,
            PartRecord::read(&mut reader)?,
            PartRecord::read(&mut reader)?,
            PartRecord::read(&mut reader)?,
        ];

        if !partitions.iter().any(|p| p.os_type == PROTECTIVE_OS_TYPE) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "no 0xEE (GPT-protective) partition entry",
            ));
        }

        Ok(Self { partitions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protective_sector() -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[446 + 4] = PROTECTIVE_OS_TYPE;
        sector[446 + 8..446 + 12].copy_from_slice(&1u32.to_le_bytes());
        sector[446 + 12..446 + 16].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector
    }

    #[test]
    fn accepts_valid_pmbr() {
        let sector = protective_sector();
        let mbr = ProtectiveMbr::parse(&sector).unwrap();
        assert_eq!(mbr.partitions[0].os_type, PROTECTIVE_OS_TYPE);
    }

    #[test]
    fn rejects_missing_signature() {
        let mut sector = protective_sector();
        sector[511] = 0x00;
        assert!(ProtectiveMbr::parse(&sector).is_err());
    }

    #[test]
    fn rejects_no_protective_entry() {
        let mut sector = protective_sector();
        sector[446 + 4] = 0x00;
        assert!(ProtectiveMbr::parse(&sector).is_err());
    }
}
