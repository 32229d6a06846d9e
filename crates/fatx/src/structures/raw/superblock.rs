/// The partition superblock header as stored at the partition base.
///
/// Only the first 16 bytes carry meaning for the driver; the rest of the
/// 4096-byte superblock region is padding up to the allocation table.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawSuperblock {
    /// Must decode (big-endian) to [`SUPERBLOCK_MAGIC`].
    ///
    /// [`SUPERBLOCK_MAGIC`]: super::constants::SUPERBLOCK_MAGIC
    pub magic: [u8; 4],
    /// Volume identifier; ignored by the driver.
    pub partition_id: [u8; 4],
    pub sectors_per_block: [u8; 4],
    pub root_dir_block: [u8; 4],
}

impl RawSuperblock {
    pub fn from_bytes(bytes: &[u8]) -> &Self {
        bytemuck::from_bytes(bytes)
    }
}
