use thiserror::Error;

/// Errors surfaced by drive, partition and entry operations.
///
/// Malformed records and superblocks are never errors: the affected entity
/// is marked invalid during parsing and simply not exposed. Chain cycles and
/// out-of-range links likewise end traversal early rather than failing.
#[derive(Debug, Error)]
pub enum Error {
    /// The drive's single-flight guard is already held by another operation.
    #[error("drive is busy with another operation")]
    Busy,

    /// No known partition layout produced a valid superblock.
    #[error("device is not FATX formatted")]
    NotFatx,

    /// Not enough free blocks to satisfy an allocation request. Nothing is
    /// committed; partial allocations never happen.
    #[error("not enough free blocks: requested {requested}, found {found}")]
    ChainExhausted { requested: u32, found: u32 },

    /// The entry's start block does not resolve to any chain.
    #[error("entry has no allocated block chain")]
    MissingChain,

    /// The chain is shorter than the entry's stored size requires.
    #[error("chain of {blocks} blocks cannot back {size} bytes")]
    ChainTruncated { blocks: usize, size: u32 },

    /// A block index points outside the partition's data region.
    #[error("block {0} is outside the data region")]
    InvalidBlock(u32),

    /// Files cannot be written with no content; a valid file entry always
    /// owns at least one block of data.
    #[error("file data must not be empty")]
    EmptyFile,

    /// An entry with this name already exists at the current level.
    #[error("an entry named {0:?} already exists")]
    AlreadyExists(String),

    /// The name is empty, too long or contains illegal characters.
    #[error("invalid entry name {0:?}")]
    InvalidName(String),

    /// Path navigation failed to resolve a component.
    #[error("path not found: {0:?}")]
    NotFound(String),

    /// The file's data blocks do not hold a decodable nested package.
    #[error("package lookup failed: {0}")]
    Package(String),

    /// An underlying stream read, write or flush failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
