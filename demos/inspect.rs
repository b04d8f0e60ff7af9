use std::error::Error;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use gpt_core::{BlockDevice, GptHandle, MediumGeometry};

struct FileDevice {
    file: File,
    geometry: MediumGeometry,
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

fn main() {
    if let Err(e) = run() {
        eprintln!("Failed to inspect image: {}", e);
        std::process::exit(1)
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let input = std::env::args().nth(1).ok_or("usage: inspect <disk-image>")?;
    let file = File::open(&input)?;
    let total_sectors = file.metadata()?.len() / 512;
    let mut device = FileDevice {
        file,
        geometry: MediumGeometry::new(9, Some(total_sectors)),
    };

    let handle = GptHandle::read(&mut device)?;
    println!("status: {:?}", handle.status());
    println!("disk GUID: {}", handle.disk_uuid()?);
    println!("primary header: {:#?}", handle.primary_header());
    println!("backup header: {:#?}", handle.backup_header());

    for n in 0..handle.primary_header().map(|h| h.maxpart).unwrap_or(0) {
        if let Some(entry) = handle.get_partentry(n) {
            if entry.is_used() {
                println!(
                    "  {:>3}: {:<36} {} [{}..={}]",
                    n,
                    handle.part_label(n)?,
                    handle.part_uuid(n)?,
                    entry.first_lba,
                    entry.last_lba
                );
            }
        }
    }

    Ok(())
}
