//! The file system as seen by the paging core: a flat namespace of
//! fixed-size, byte-addressable files.

#[cfg(all(unix, not(target_os = "none")))]
mod hostfs;
mod ramfs;

#[cfg(all(unix, not(target_os = "none")))]
pub use hostfs::HostFs;
pub use ramfs::RamFs;

use alloc::{boxed::Box, string::String};
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};

/// Error type for file system operations
pub enum FsError {
    /// A file with this name already exists
    AlreadyExists,
    /// No file with this name exists
    NotFound,
    /// The underlying storage failed
    Io(String),
}

impl Debug for FsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            FsError::AlreadyExists => write!(f, "AlreadyExists"),
            FsError::NotFound => write!(f, "NotFound"),
            FsError::Io(message) => write!(f, "Io({message:?})"),
        }
    }
}

impl Display for FsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            FsError::AlreadyExists => write!(f, "file already exists"),
            FsError::NotFound => write!(f, "file not found"),
            FsError::Io(message) => write!(f, "i/o error: {message}"),
        }
    }
}

impl Error for FsError {}

/// An open file. Files never grow: reads and writes past `length` are cut
/// short and report how many bytes were actually transferred.
pub trait OpenFile {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, FsError>;
    fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<usize, FsError>;
    fn length(&self) -> usize;
}

pub trait FileSystem {
    /// Create a file of `size` bytes that reads as zeroes until written.
    fn create(&mut self, name: &str, size: usize) -> Result<(), FsError>;
    fn open(&mut self, name: &str) -> Result<Box<dyn OpenFile>, FsError>;
    fn remove(&mut self, name: &str) -> Result<(), FsError>;
    fn exists(&self, name: &str) -> bool;
}
