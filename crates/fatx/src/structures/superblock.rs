//! The partition superblock.

use crate::structures::raw::constants::SUPERBLOCK_MAGIC;
use crate::structures::raw::RawSuperblock;

/// Parsed superblock header fields.
///
/// A failed magic check yields `None` rather than an error: the partition is
/// simply not a FATX volume and is skipped by the drive.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub sectors_per_block: u32,
    pub root_dir_block: u32,
}

impl Superblock {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let raw = RawSuperblock::from_bytes(bytes);
        if u32::from_be_bytes(raw.magic) != SUPERBLOCK_MAGIC {
            return None;
        }
        Some(Self {
            sectors_per_block: u32::from_be_bytes(raw.sectors_per_block),
            root_dir_block: u32::from_be_bytes(raw.root_dir_block),
        })
    }
}
