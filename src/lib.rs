//! Reads, validates, repairs, and writes GUID Partition Tables (GPT).
//!
//! This crate is the GPT core consumed by a bootloader: it enumerates
//! partitions, extracts partition labels/UUIDs, and repairs tables whose
//! backup copy has drifted (e.g. after the underlying medium was
//! resized). It treats the block device, UTF-16 transcoding, and the
//! CRC-32 primitive as external collaborators, and never creates a GPT
//! from scratch.

#![deny(missing_docs)]

#[macro_use]
mod logging;

mod crc;
pub mod device;
mod entries;
pub mod error;
pub mod guid;
pub mod gpt;
pub mod header;
pub mod mbr;

pub use device::{BlockDevice, MediumGeometry};
pub use entries::{Entry, EntryArray};
pub use error::{GptError, GptErrorKind, Result};
pub use gpt::{GptHandle, Status};
