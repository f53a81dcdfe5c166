use super::{FileSystem, FsError, OpenFile};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::{vec, vec::Vec};
use core::cell::RefCell;
use pagingos_shared::sizes::SECTOR_SIZE;

type Sector = [u8; SECTOR_SIZE];

/// A file system kept entirely in memory, stored as whole sectors.
#[derive(Default)]
pub struct RamFs {
    files: BTreeMap<String, Rc<RefCell<RamFile>>>,
}

struct RamFile {
    sects: Vec<Sector>,
    length: usize,
}

// Open handles share the file's sectors; removing the name doesn't invalidate
// them.
struct RamFileHandle {
    file: Rc<RefCell<RamFile>>,
}

impl RamFs {
    pub fn new() -> RamFs {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl RamFile {
    fn new(length: usize) -> RamFile {
        RamFile {
            sects: vec![[0; SECTOR_SIZE]; length.div_ceil(SECTOR_SIZE)],
            length,
        }
    }

    fn transfer_len(&self, requested: usize, offset: usize) -> usize {
        requested.min(self.length.saturating_sub(offset))
    }

    fn read(&self, buf: &mut [u8], offset: usize) -> usize {
        let len = self.transfer_len(buf.len(), offset);
        let mut done = 0;
        while done < len {
            let pos = offset + done;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(len - done);
            buf[done..done + chunk]
                .copy_from_slice(&self.sects[pos / SECTOR_SIZE][within..within + chunk]);
            done += chunk;
        }
        len
    }

    fn write(&mut self, buf: &[u8], offset: usize) -> usize {
        let len = self.transfer_len(buf.len(), offset);
        let mut done = 0;
        while done < len {
            let pos = offset + done;
            let within = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within).min(len - done);
            self.sects[pos / SECTOR_SIZE][within..within + chunk]
                .copy_from_slice(&buf[done..done + chunk]);
            done += chunk;
        }
        len
    }
}

impl OpenFile for RamFileHandle {
    fn read_at(&self, buf: &mut [u8], offset: usize) -> Result<usize, FsError> {
        Ok(self.file.borrow().read(buf, offset))
    }

    fn write_at(&mut self, buf: &[u8], offset: usize) -> Result<usize, FsError> {
        Ok(self.file.borrow_mut().write(buf, offset))
    }

    fn length(&self) -> usize {
        self.file.borrow().length
    }
}

impl FileSystem for RamFs {
    fn create(&mut self, name: &str, size: usize) -> Result<(), FsError> {
        if self.files.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        self.files
            .insert(name.to_string(), Rc::new(RefCell::new(RamFile::new(size))));
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<Box<dyn OpenFile>, FsError> {
        let file = self.files.get(name).ok_or(FsError::NotFound)?;
        Ok(Box::new(RamFileHandle {
            file: Rc::clone(file),
        }))
    }

    fn remove(&mut self, name: &str) -> Result<(), FsError> {
        self.files.remove(name).map(|_| ()).ok_or(FsError::NotFound)
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}
