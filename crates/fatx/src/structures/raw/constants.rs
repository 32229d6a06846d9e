//! On-disk constants for the FATX layout.

/// Superblock magic as read big-endian from the partition base.
///
/// The bytes on disk are `58 54 41 46` ("XTAF"); decoded big-endian they
/// spell "FATX" read backwards, which is how the console stores it.
pub const SUPERBLOCK_MAGIC: u32 = 0x5854_4146;

/// End-of-chain sentinel for 16-bit allocation tables.
pub const FATX16_CHAIN_END: u16 = 0xFFFF;
/// End-of-chain sentinel for 32-bit allocation tables.
pub const FATX32_CHAIN_END: u32 = 0xFFFF_FFFF;
/// Table entry value marking a free block.
pub const BLOCK_FREE: u32 = 0;

/// Partitions with fewer blocks than this use 16-bit table entries.
pub const FATX16_BLOCK_THRESHOLD: u32 = 0xFFF5;

/// The allocation table region starts at this offset from the partition base
/// and is sized in multiples of this alignment.
pub const FAT_REGION_OFFSET: u64 = 0x1000;
pub const FAT_REGION_ALIGN: u32 = 0x1000;

/// Size of one directory record.
pub const ENTRY_SIZE: usize = 0x40;
/// Longest legal entry name, in bytes.
pub const MAX_NAME_LEN: usize = 0x2A;

/// Name-length byte of a deleted (tombstoned) record.
pub const NAME_TOMBSTONE: u8 = 0xE5;
/// Name-length bytes marking an uninitialized record; scanning stops here.
pub const NAME_END: u8 = 0x00;
pub const NAME_END_ALT: u8 = 0xFF;
