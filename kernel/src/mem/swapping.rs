use crate::fs::{FileSystem, FsError, OpenFile};
use alloc::boxed::Box;
use alloc::string::String;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use log::debug;
use pagingos_shared::mem::PAGE_SIZE;

// Names longer than this are cut short before the suffix is added.
pub const SWAP_NAME_LIMIT: usize = 32;
pub const SWAP_SUFFIX: &str = ".swap";

/// The swap file name for a process called `display_name`.
pub fn swap_file_name(display_name: &str) -> String {
    let mut name: String = display_name.chars().take(SWAP_NAME_LIMIT).collect();
    name.push_str(SWAP_SUFFIX);
    name
}

/// Error type for swap store operations
pub enum SwapError {
    /// The backing file could not be created or opened
    Create { name: String, source: FsError },
    /// The transfer falls outside the swap store
    OutOfRange { offset: usize, len: usize, size: usize },
    /// The backing file transferred fewer bytes than asked for
    ShortTransfer { offset: usize, expected: usize, actual: usize },
    /// The backing file failed
    Fs(FsError),
}

impl Debug for SwapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SwapError::Create { name, source } => write!(f, "Create({name:?}, {source:?})"),
            SwapError::OutOfRange { offset, len, size } => {
                write!(f, "OutOfRange {{ offset: {offset}, len: {len}, size: {size} }}")
            }
            SwapError::ShortTransfer {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "ShortTransfer {{ offset: {offset}, expected: {expected}, actual: {actual} }}"
            ),
            SwapError::Fs(err) => write!(f, "Fs({err:?})"),
        }
    }
}

impl Display for SwapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SwapError::Create { name, source } => {
                write!(f, "swap file {name} create failed: {source}")
            }
            SwapError::OutOfRange { offset, len, size } => write!(
                f,
                "transfer of {len} bytes at {offset} is outside a {size} byte swap store"
            ),
            SwapError::ShortTransfer {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "swap transfer at {offset} moved {actual} of {expected} bytes"
            ),
            SwapError::Fs(err) => Display::fmt(err, f),
        }
    }
}

impl Error for SwapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SwapError::Create { source, .. } | SwapError::Fs(source) => Some(source),
            _ => None,
        }
    }
}

/// Backing storage for every page of one address space, kept in a file of
/// its own.
pub struct SwapStore {
    name: String,
    file: Box<dyn OpenFile>,
    size: usize,
}

impl SwapStore {
    /// Creates a zero-filled swap file of `size` bytes for `display_name`.
    pub fn create(
        fs: &mut dyn FileSystem,
        display_name: &str,
        size: usize,
    ) -> Result<SwapStore, SwapError> {
        let name = swap_file_name(display_name);
        if let Err(source) = fs.create(&name, size) {
            return Err(SwapError::Create { name, source });
        }
        let file = match fs.open(&name) {
            Ok(file) => file,
            Err(source) => {
                // Don't leave a file behind that nobody owns.
                fs.remove(&name).ok();
                return Err(SwapError::Create { name, source });
            }
        };
        debug!("created swap file {name} of {size} bytes");

        Ok(SwapStore { name, file, size })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), SwapError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(SwapError::OutOfRange {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<(), SwapError> {
        self.check_range(offset, buf.len())?;
        let actual = self.file.read_at(buf, offset).map_err(SwapError::Fs)?;
        if actual != buf.len() {
            return Err(SwapError::ShortTransfer {
                offset,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    pub fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<(), SwapError> {
        self.check_range(offset, buf.len())?;
        let actual = self.file.write_at(buf, offset).map_err(SwapError::Fs)?;
        if actual != buf.len() {
            return Err(SwapError::ShortTransfer {
                offset,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    pub fn read_page(&self, vpn: usize, frame: &mut [u8]) -> Result<(), SwapError> {
        self.read_at(&mut frame[..PAGE_SIZE], vpn * PAGE_SIZE)
    }

    pub fn write_page(&mut self, vpn: usize, frame: &[u8]) -> Result<(), SwapError> {
        self.write_at(&frame[..PAGE_SIZE], vpn * PAGE_SIZE)
    }

    /// Closes the swap file and removes it from the file system.
    pub fn destroy(self, fs: &mut dyn FileSystem) -> Result<(), SwapError> {
        let SwapStore { name, file, .. } = self;
        drop(file);
        fs.remove(&name).map_err(SwapError::Fs)?;
        debug!("removed swap file {name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamFs;

    #[test]
    fn name_is_truncated_and_suffixed() {
        assert_eq!(swap_file_name("sort"), "sort.swap");
        let long = "a".repeat(40);
        assert_eq!(swap_file_name(&long), format!("{}.swap", "a".repeat(32)));
    }

    #[test]
    fn round_trip_and_zero_fill() {
        let mut fs = RamFs::new();
        let mut swap = SwapStore::create(&mut fs, "p", 4 * PAGE_SIZE).unwrap();
        assert!(fs.exists("p.swap"));

        swap.write_at(b"dirty page", 2 * PAGE_SIZE + 5).unwrap();
        let mut buf = [0; 10];
        swap.read_at(&mut buf, 2 * PAGE_SIZE + 5).unwrap();
        assert_eq!(&buf, b"dirty page");

        let mut page = [0xFF; PAGE_SIZE];
        swap.read_page(3, &mut page).unwrap();
        assert_eq!(page, [0; PAGE_SIZE]);
    }

    #[test]
    fn out_of_range_transfers_are_rejected() {
        let mut fs = RamFs::new();
        let mut swap = SwapStore::create(&mut fs, "p", 2 * PAGE_SIZE).unwrap();
        let page = [1; PAGE_SIZE];
        assert!(matches!(
            swap.write_page(2, &page),
            Err(SwapError::OutOfRange { offset, .. }) if offset == 2 * PAGE_SIZE
        ));
        let mut buf = [0; 4];
        assert!(swap.read_at(&mut buf, usize::MAX - 1).is_err());
    }

    #[test]
    fn second_store_with_same_name_fails() {
        let mut fs = RamFs::new();
        let _first = SwapStore::create(&mut fs, "twin", PAGE_SIZE).unwrap();
        assert!(matches!(
            SwapStore::create(&mut fs, "twin", PAGE_SIZE),
            Err(SwapError::Create { source: FsError::AlreadyExists, .. })
        ));
    }

    #[test]
    fn destroy_removes_backing_file() {
        let mut fs = RamFs::new();
        let swap = SwapStore::create(&mut fs, "gone", PAGE_SIZE).unwrap();
        swap.destroy(&mut fs).unwrap();
        assert!(!fs.exists("gone.swap"));
    }
}
