/// One 64-byte directory record as stored on disk.
///
/// All multi-byte fields are big-endian. A record's state is encoded in
/// `name_len`: 0xE5 marks a tombstoned (deleted) record, 0x00 and 0xFF mark
/// the end of a directory scan, and anything above 0x2A is corrupt.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawDirectoryEntry {
    /// Stored name length; doubles as the record-state sentinel byte.
    pub name_len: u8,
    /// Attribute byte; bit 4 (0x10) marks a folder.
    pub attributes: u8,
    /// ASCII name, zero-padded to 42 bytes.
    pub name: [u8; 42],
    /// First block of the record's data chain.
    pub start_block: [u8; 4],
    /// Stored size in bytes; zero for folders.
    pub size: [u8; 4],
    pub created: [u8; 4],
    pub modified: [u8; 4],
    pub accessed: [u8; 4],
}

impl RawDirectoryEntry {
    pub fn from_bytes(bytes: &[u8]) -> &Self {
        bytemuck::from_bytes(bytes)
    }
}
