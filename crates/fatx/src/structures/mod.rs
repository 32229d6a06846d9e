//! Structures for the FATX on-disk format.
//!
//! Raw byte layouts live in `raw`; the other modules hold the parsed forms:
//! `superblock` for the partition header, `fat` for the block allocation
//! table, `directory` for 64-byte entry records and `time` for the packed
//! timestamp integer.

pub mod raw;

pub mod directory;
pub mod fat;
pub mod superblock;
pub mod time;

pub use directory::{is_valid_name, EntryAttributes, EntryRecord, ParsedRecord};
pub use fat::{AllocationTable, TableWidth};
pub use superblock::Superblock;
pub use time::FatxTimestamp;
