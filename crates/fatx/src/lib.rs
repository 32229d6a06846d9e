//! A library for working with FATX file systems, as found on console hard
//! drives, memory units and USB sticks.
//!
//! Supports reading and writing to FATX devices: listing partitions and
//! directories, extracting files and folders, and injecting, replacing,
//! adding, renaming and deleting entries.
//!
//! Open a device image with [`Drive::open_image`] (or hand any
//! `Read + Write + Seek + Send` stream to [`Drive::from_stream`]); the drive
//! kind and partition layout are detected automatically. All multi-byte
//! on-disk integers are big endian.

pub mod error;
pub mod fs;
pub mod structures;

pub use error::{Error, Result};
pub use fatx_io::{BlockStream, ReadSeek};
pub use fs::{
    AddMode, ChainReader, Drive, DriveKind, FileEntry, FolderContents, FolderEntry, PackageParser,
    Partition,
};
