//! Parsed directory records.
//!
//! A directory is a sequence of fixed 64-byte records. Parsing classifies
//! each record as valid, tombstoned (deleted, skipped by scans) or an
//! end-of-scan marker; malformed records are never surfaced to callers.

use crate::structures::raw::constants::{
    FATX32_CHAIN_END, MAX_NAME_LEN, NAME_END, NAME_END_ALT, NAME_TOMBSTONE,
};
use crate::structures::raw::RawDirectoryEntry;
use crate::structures::time::FatxTimestamp;

bitflags::bitflags! {
    /// Directory record attributes. Only the folder bit is meaningful to
    /// this driver; the remaining bits are preserved as zero on write.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryAttributes: u8 {
        const FOLDER = 0x10;
    }
}

/// Characters rejected in entry names, on top of non-printable ASCII.
const ILLEGAL_NAME_CHARS: &[u8] = br#""*+,/:;<=>?\|"#;

/// Checks a proposed entry name: ASCII printable, 1..=42 bytes, no path
/// separators or wildcard characters.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| (0x20..0x7F).contains(&b) && !ILLEGAL_NAME_CHARS.contains(&b))
}

/// Result of decoding one 64-byte record slot.
#[derive(Debug)]
pub enum ParsedRecord {
    Valid(EntryRecord),
    /// A deleted record; scans skip it and keep going.
    Tombstone,
    /// Uninitialized or corrupt; scanning the block stops here.
    EndOfScan,
}

/// The in-memory form of one directory record, shared by the file and
/// folder entry variants.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub(crate) name_len: u8,
    pub(crate) name: String,
    pub(crate) is_folder: bool,
    pub(crate) size: u32,
    pub(crate) start_block: u32,
    pub(crate) created: FatxTimestamp,
    pub(crate) modified: FatxTimestamp,
    pub(crate) accessed: FatxTimestamp,
    /// Directory-region byte offset of the record, for in-place rewrite.
    pub(crate) offset: u64,
}

impl EntryRecord {
    /// Decodes a 64-byte record read at directory offset `offset`.
    ///
    /// Validation order matches the on-disk semantics: name-length sentinels
    /// first (no further fields are read for tombstones and end markers),
    /// then the name, the terminal-sentinel start block, and finally the
    /// size — a non-folder with size 0 is always invalid.
    pub fn parse(bytes: &[u8], offset: u64) -> ParsedRecord {
        let raw = RawDirectoryEntry::from_bytes(bytes);
        if raw.name_len == NAME_TOMBSTONE {
            return ParsedRecord::Tombstone;
        }
        if raw.name_len == NAME_END
            || raw.name_len == NAME_END_ALT
            || raw.name_len as usize > MAX_NAME_LEN
        {
            return ParsedRecord::EndOfScan;
        }

        let is_folder = EntryAttributes::from_bits_truncate(raw.attributes)
            .contains(EntryAttributes::FOLDER);
        let name_len = (raw.name_len & 0x3F) as usize;
        let name = match core::str::from_utf8(&raw.name[..name_len]) {
            Ok(name) if is_valid_name(name) => name.to_owned(),
            _ => return ParsedRecord::EndOfScan,
        };

        let start_block = u32::from_be_bytes(raw.start_block);
        if start_block == FATX32_CHAIN_END {
            return ParsedRecord::EndOfScan;
        }

        let size = u32::from_be_bytes(raw.size);
        if !is_folder && size == 0 {
            return ParsedRecord::EndOfScan;
        }

        ParsedRecord::Valid(EntryRecord {
            name_len: raw.name_len,
            name,
            is_folder,
            size,
            start_block,
            created: FatxTimestamp::new(u32::from_be_bytes(raw.created)),
            modified: FatxTimestamp::new(u32::from_be_bytes(raw.modified)),
            accessed: FatxTimestamp::new(u32::from_be_bytes(raw.accessed)),
            offset,
        })
    }

    /// Builds a fresh record for a new file or folder, timestamped now.
    pub(crate) fn create(
        name: &str,
        start_block: u32,
        size: u32,
        offset: u64,
        is_folder: bool,
    ) -> Self {
        let now = FatxTimestamp::now();
        Self {
            name_len: name.len() as u8,
            name: name.to_owned(),
            is_folder,
            size: if is_folder { 0 } else { size },
            start_block,
            created: now,
            modified: now,
            accessed: now,
            offset,
        }
    }

    /// Serializes the record into its deterministic 64-byte layout.
    pub fn serialize(&self) -> [u8; 64] {
        let mut name = [0u8; 42];
        name[..self.name.len()].copy_from_slice(self.name.as_bytes());
        let raw = RawDirectoryEntry {
            name_len: self.name_len,
            attributes: if self.is_folder {
                EntryAttributes::FOLDER.bits()
            } else {
                0
            },
            name,
            start_block: self.start_block.to_be_bytes(),
            size: self.size.to_be_bytes(),
            created: self.created.raw().to_be_bytes(),
            modified: self.modified.raw().to_be_bytes(),
            accessed: self.accessed.raw().to_be_bytes(),
        };
        bytemuck::cast(raw)
    }

    /// Marks the record deleted. Only the name-length byte changes; the rest
    /// of the record is left intact so the slot can be inspected or reused.
    pub fn tombstone(&mut self) {
        self.name_len = NAME_TOMBSTONE;
    }

    pub fn is_tombstoned(&self) -> bool {
        self.name_len == NAME_TOMBSTONE
    }

    /// Renames the record in place. The stored length byte follows the new
    /// name unless the record is tombstoned.
    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
        if !self.is_tombstoned() {
            self.name_len = name.len() as u8;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn start_block(&self) -> u32 {
        self.start_block
    }

    pub fn created(&self) -> FatxTimestamp {
        self.created
    }

    pub fn modified(&self) -> FatxTimestamp {
        self.modified
    }

    pub fn accessed(&self) -> FatxTimestamp {
        self.accessed
    }

    /// The directory-region byte offset this record was read from.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
