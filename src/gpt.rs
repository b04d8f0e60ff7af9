//! The GPT handle: reader, repairer, updater, writer, and partition
//! queries.

use bitflags::bitflags;

use crate::device::{read_at, write_at, BlockDevice};
use crate::entries::{Entry, EntryArray};
use crate::error::{GptError, GptErrorKind, Result, ResultExt};
use crate::guid::guid_to_string;
use crate::header::{check_backup, check_primary, mirror_consistent, Header, HEADER_SIZE};
use crate::mbr::ProtectiveMbr;

bitflags! {
    /// The handle's status bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Sector 0 is a valid protective MBR.
        const PROTECTIVE_MBR      = 1 << 0;
        /// The primary header passed `check_primary`.
        const PRIMARY_HEADER_VALID  = 1 << 1;
        /// The primary entry array CRC-checked against the primary header.
        const PRIMARY_ENTRIES_VALID = 1 << 2;
        /// The backup header passed `check_backup` and mirrors the primary (or stands alone).
        const BACKUP_HEADER_VALID   = 1 << 3;
        /// The backup entry array CRC-checked against the backup header.
        const BACKUP_ENTRIES_VALID  = 1 << 4;
    }
}

const FULLY_VALID: Status = Status::from_bits_truncate(
    Status::PRIMARY_HEADER_VALID.bits()
        | Status::PRIMARY_ENTRIES_VALID.bits()
        | Status::BACKUP_HEADER_VALID.bits()
        | Status::BACKUP_ENTRIES_VALID.bits(),
);
const PRIMARY_FULLY_VALID: Status =
    Status::from_bits_truncate(Status::PRIMARY_HEADER_VALID.bits() | Status::PRIMARY_ENTRIES_VALID.bits());
const BACKUP_FULLY_VALID: Status =
    Status::from_bits_truncate(Status::BACKUP_HEADER_VALID.bits() | Status::BACKUP_ENTRIES_VALID.bits());

/// The GPT handle: the aggregate the reader builds, the repairer and
/// updater mutate, and the writer consumes.
#[derive(Debug)]
pub struct GptHandle {
    pmbr: Option<ProtectiveMbr>,
    primary: Option<Header>,
    backup: Option<Header>,
    entries: Option<EntryArray>,
    log_sector_size: u32,
    status: Status,
}

impl GptHandle {
    /// Current status bitmask.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The primary header, if it validated.
    pub fn primary_header(&self) -> Option<&Header> {
        self.primary.as_ref()
    }

    /// The backup header, if it validated.
    pub fn backup_header(&self) -> Option<&Header> {
        self.backup.as_ref()
    }

    /// The protective MBR read from sector 0, if it validated.
    pub fn protective_mbr(&self) -> Option<&ProtectiveMbr> {
        self.pmbr.as_ref()
    }

    /// The logical sector size captured at read time.
    pub fn log_sector_size(&self) -> u32 {
        self.log_sector_size
    }

    fn authoritative_header(&self) -> Option<&Header> {
        if self.status.contains(Status::PRIMARY_HEADER_VALID) {
            self.primary.as_ref()
        } else {
            self.backup.as_ref()
        }
    }

    /// The disk GUID of the currently-authoritative header.
    pub fn disk_uuid(&self) -> Result<String> {
        self.authoritative_header()
            .map(|h| guid_to_string(&h.guid))
            .ok_or_else(|| GptError::new(GptErrorKind::BadArgument, "no authoritative header"))
    }

    /// The entry at index `n`, or `None` if `n >= maxpart`.
    pub fn get_partentry(&self, n: u32) -> Option<Entry> {
        self.entries.as_ref()?.entry(n)
    }

    /// The partition's decoded UTF-8 name.
    pub fn part_label(&self, n: u32) -> Result<String> {
        self.get_partentry(n)
            .map(|e| e.name())
            .ok_or_else(|| GptError::new(GptErrorKind::BadArgument, "no such partition entry"))
    }

    /// The partition's GUID, canonically formatted.
    pub fn part_uuid(&self, n: u32) -> Result<String> {
        self.get_partentry(n)
            .map(|e| guid_to_string(&e.part_guid))
            .ok_or_else(|| GptError::new(GptErrorKind::BadArgument, "no such partition entry"))
    }

    /// Read and cross-validate a GPT from `device`.
    pub fn read<D: BlockDevice>(device: &mut D) -> Result<GptHandle> {
        let geometry = device.geometry();
        let log_sector_size = geometry.log_sector_size;
        let mut status = Status::empty();

        // Step 2: PMBR is optional; failures here are consumed, not surfaced.
        let pmbr = read_pmbr(device, &geometry).ok();
        if pmbr.is_some() {
            status.insert(Status::PROTECTIVE_MBR);
        }

        // Step 4: candidate primary header + entries.
        let primary_result = read_header_at(device, 1).and_then(|h| {
            check_primary(&h, log_sector_size)?;
            Ok(h)
        });
        let mut primary = primary_result.as_ref().ok().cloned();
        let mut entries: Option<EntryArray> = None;
        if let Some(header) = &primary {
            status.insert(Status::PRIMARY_HEADER_VALID);
            match read_entries_raw(device, header).and_then(|raw| EntryArray::from_raw(header, raw)) {
                Ok(arr) => {
                    status.insert(Status::PRIMARY_ENTRIES_VALID);
                    entries = Some(arr);
                }
                Err(e) => trace!("primary entry array invalid: {}", e),
            }
        }

        // Step 5: locate the backup sector.
        let backup_sector = match (&primary, geometry.total_sectors) {
            (Some(p), Some(total)) => {
                if p.alternate_lba >= total {
                    return Err(GptError::new(
                        GptErrorKind::OutOfRange,
                        "primary alternate_lba exceeds medium size",
                    ));
                }
                p.alternate_lba
            }
            (Some(p), None) => p.alternate_lba,
            (None, Some(total)) => total - 1,
            (None, None) => {
                return Err(GptError::new(
                    GptErrorKind::OutOfRange,
                    "size unknown, cannot locate backup",
                ))
            }
        };

        // Step 6: candidate backup header, plus mirror-consistency against primary.
        let backup_result = read_header_at(device, backup_sector).and_then(|h| {
            check_backup(&h, log_sector_size)?;
            if h.header_lba != backup_sector {
                return Err(GptError::new(
                    GptErrorKind::BadPartTable,
                    "backup header_lba does not match the sector it was read from",
                ));
            }
            Ok(h)
        });

        if let (Some(p), Ok(b)) = (&primary, &backup_result) {
            if !mirror_consistent(p, b) {
                return Err(GptError::new(GptErrorKind::BadPartTable, "backup GPT out of sync"));
            }
        }
        let mut backup = backup_result.as_ref().ok().cloned();
        if backup.is_some() {
            status.insert(Status::BACKUP_HEADER_VALID);
        }

        // Step 7: reconcile entry arrays, without leaking a second buffer.
        if let (Some(primary_entries), Some(backup_header)) = (&entries, &backup) {
            let raw_backup = read_entries_raw(device, backup_header)?;
            if raw_backup != primary_entries.as_bytes() {
                return Err(GptError::new(GptErrorKind::BadPartTable, "backup GPT out of sync"));
            }
            status.insert(Status::BACKUP_ENTRIES_VALID);
        } else if entries.is_none() {
            if let Some(backup_header) = &backup {
                if let Ok(raw) = read_entries_raw(device, backup_header) {
                    if let Ok(arr) = EntryArray::from_raw(backup_header, raw) {
                        status.insert(Status::BACKUP_ENTRIES_VALID);
                        entries = Some(arr);
                    }
                }
            }
        }

        // Step 8: final disposition.
        let primary_ok = status.contains(PRIMARY_FULLY_VALID);
        let backup_ok = status.contains(BACKUP_FULLY_VALID);
        if !primary_ok && !backup_ok {
            return Err(primary_result.unwrap_err());
        }
        if !primary_ok {
            primary = None;
        }
        if !backup_ok {
            backup = None;
        }

        debug!("read complete: status={:?}", status);
        Ok(GptHandle {
            pmbr,
            primary,
            backup,
            entries,
            log_sector_size,
            status,
        })
    }

    /// Reconstruct the missing copy from the surviving one.
    pub fn repair<D: BlockDevice>(&mut self, device: &mut D) -> Result<()> {
        if self.status.contains(FULLY_VALID) {
            return Ok(());
        }
        let geometry = device.geometry();
        if geometry.log_sector_size != self.log_sector_size {
            return Err(GptError::new(
                GptErrorKind::NotImplementedYet,
                "medium sector size no longer matches the handle's",
            ));
        }
        let sector_size = geometry.sector_size();

        if self.status.contains(PRIMARY_FULLY_VALID) {
            let mut primary = self.primary.clone().expect("primary marked valid");
            let mut backup_lba = primary.alternate_lba;
            if let Some(total) = geometry.total_sectors {
                if total - 1 > backup_lba {
                    backup_lba = total - 1;
                    primary.alternate_lba = backup_lba;
                }
            }
            let entries_sectors = crate::header::ceil_div(primary.entries_size()?, sector_size);
            let mut backup = primary.clone();
            backup.header_lba = primary.alternate_lba;
            backup.alternate_lba = primary.header_lba;
            backup.partitions_lba = backup_lba - entries_sectors;
            self.primary = Some(primary);
            self.backup = Some(backup);
        } else if self.status.contains(BACKUP_FULLY_VALID) {
            let backup = self.backup.clone().expect("backup marked valid");
            let mut primary = backup.clone();
            primary.header_lba = backup.alternate_lba;
            primary.alternate_lba = backup.header_lba;
            primary.partitions_lba = 2;
            self.primary = Some(primary);
            self.backup = Some(backup);
        } else {
            return Err(GptError::new(
                GptErrorKind::Bug,
                "repair called with neither copy valid",
            ));
        }

        if let Err(e) = self.update() {
            error!("updater refused repaired state: {}", e);
            return Err(GptError::new(GptErrorKind::Bug, e.to_string()));
        }
        Ok(())
    }

    /// Recompute all CRCs and re-validate.
    pub fn update(&mut self) -> Result<()> {
        self.status.remove(FULLY_VALID);

        let entries_crc = self
            .entries
            .as_ref()
            .ok_or_else(|| GptError::new(GptErrorKind::Bug, "update called without an entry array"))?
            .crc32();

        let (primary, backup) = match (self.primary.as_mut(), self.backup.as_mut()) {
            (Some(p), Some(b)) => (p, b),
            _ => return Err(GptError::new(GptErrorKind::Bug, "update called with a missing header")),
        };

        primary.headersize = HEADER_SIZE;
        backup.headersize = HEADER_SIZE;
        primary.partentry_crc32 = entries_crc;
        backup.partentry_crc32 = entries_crc;
        primary.crc32 = primary.compute_crc32();
        backup.crc32 = backup.compute_crc32();

        check_primary(primary, self.log_sector_size).map_err(|e| GptError::new(GptErrorKind::Bug, e.to_string()))?;
        check_backup(backup, self.log_sector_size).map_err(|e| GptError::new(GptErrorKind::Bug, e.to_string()))?;
        if !mirror_consistent(primary, backup) {
            return Err(GptError::new(
                GptErrorKind::Bug,
                "updater produced mirror-inconsistent headers",
            ));
        }

        self.status.insert(FULLY_VALID);
        Ok(())
    }

    /// Write the backup copy, then the primary.
    pub fn write<D: BlockDevice>(&self, device: &mut D) -> Result<()> {
        if !self.status.contains(FULLY_VALID) {
            return Err(GptError::new(
                GptErrorKind::BadPartTable,
                "handle is not fully valid, refusing to write",
            ));
        }
        let primary = self.primary.as_ref().expect("fully valid implies primary present");
        let backup = self.backup.as_ref().expect("fully valid implies backup present");
        let entries = self.entries.as_ref().expect("fully valid implies entries present");

        if primary.headersize != HEADER_SIZE || backup.headersize != HEADER_SIZE {
            return Err(GptError::new(
                GptErrorKind::NotImplementedYet,
                "refusing to write a non-native header size",
            ));
        }

        let geometry = device.geometry();

        // 1. Backup first.
        let skip_backup = matches!(geometry.total_sectors, Some(total) if backup.header_lba >= total);
        if skip_backup {
            warn!("backup header sector beyond medium extent, skipping backup write");
        } else {
            if backup.header_lba == 0 {
                return Err(GptError::new(GptErrorKind::Bug, "backup header_lba is 0"));
            }
            write_header_at(device, backup.header_lba, backup)?;
            if backup.partitions_lba < 2 {
                return Err(GptError::new(GptErrorKind::Bug, "backup partitions_lba < 2"));
            }
            write_at(device, backup.partitions_lba, 0, entries.as_bytes())?;
        }

        // 2. Primary second.
        if primary.header_lba == 0 {
            return Err(GptError::new(GptErrorKind::Bug, "primary header_lba is 0"));
        }
        write_header_at(device, primary.header_lba, primary)?;
        if primary.partitions_lba < 2 {
            return Err(GptError::new(GptErrorKind::Bug, "primary partitions_lba < 2"));
        }
        write_at(device, primary.partitions_lba, 0, entries.as_bytes())?;

        device.flush().map_err(GptError::from)?;
        debug!("write complete");
        Ok(())
    }
}

fn read_pmbr<D: BlockDevice>(device: &mut D, geometry: &crate::device::MediumGeometry) -> Result<ProtectiveMbr> {
    let mut sector = vec![0u8; geometry.sector_size() as usize];
    read_at(device, 0, 0, &mut sector).map_err(GptError::from)?;
    ProtectiveMbr::parse(&sector).map_err(GptError::from)
}

fn read_header_at<D: BlockDevice>(device: &mut D, sector: u64) -> Result<Header> {
    let mut buf = [0u8; HEADER_SIZE as usize];
    read_at(device, sector, 0, &mut buf).map_err(GptError::from)?;
    Header::from_bytes(&buf).context(format!("reading header at sector {sector}"))
}

fn read_entries_raw<D: BlockDevice>(device: &mut D, header: &Header) -> Result<Vec<u8>> {
    let size = header
        .entries_size()
        .context("computing entry array size")?;
    let mut buf = vec![0u8; size as usize];
    read_at(device, header.partitions_lba, 0, &mut buf).map_err(GptError::from)?;
    Ok(buf)
}

fn write_header_at<D: BlockDevice>(device: &mut D, sector: u64, header: &Header) -> Result<()> {
    let geometry = device.geometry();
    let mut buf = vec![0u8; geometry.sector_size() as usize];
    let bytes = header.to_bytes(false);
    buf[..bytes.len()].copy_from_slice(&bytes);
    write_at(device, sector, 0, &buf).map_err(GptError::from)
}
