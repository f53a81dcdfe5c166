use super::{FileSystem, FsError, OpenFile};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

/// Keeps files in a directory of the host file system.
pub struct HostFs {
    root: PathBuf,
}

struct HostFile {
    file: File,
    length: usize,
}

fn fs_error(err: io::Error) -> FsError {
    match err.kind() {
        ErrorKind::NotFound => FsError::NotFound,
        ErrorKind::AlreadyExists => FsError::AlreadyExists,
        _ => FsError::Io(err.to_string()),
    }
}

impl HostFs {
    pub fn new(root: impl Into<PathBuf>) -> HostFs {
        HostFs { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl OpenFile for HostFile {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, FsError> {
        let len = buf.len().min(self.length.saturating_sub(offset));
        self.file
            .read_exact_at(&mut buf[..len], offset as u64)
            .map_err(fs_error)?;
        Ok(len)
    }

    fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<usize, FsError> {
        let len = buf.len().min(self.length.saturating_sub(offset));
        self.file
            .write_all_at(&buf[..len], offset as u64)
            .map_err(fs_error)?;
        Ok(len)
    }

    fn length(&self) -> usize {
        self.length
    }
}

impl FileSystem for HostFs {
    fn create(&mut self, name: &str, size: usize) -> Result<(), FsError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))
            .map_err(fs_error)?;
        // Extending the file fills it with zeroes.
        file.set_len(size as u64).map_err(fs_error)
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn OpenFile>, FsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path(name))
            .map_err(fs_error)?;
        let length = file.metadata().map_err(fs_error)?.len();
        let length = usize::try_from(length).map_err(|err| FsError::Io(err.to_string()))?;
        Ok(Box::new(HostFile { file, length }))
    }

    fn remove(&mut self, name: &str) -> Result<(), FsError> {
        fs::remove_file(self.path(name)).map_err(fs_error)
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }
}
