//! Raw byte structures for the FATX on-disk format.

pub mod constants;
pub mod directory;
pub mod superblock;

pub use directory::RawDirectoryEntry;
pub use superblock::RawSuperblock;
