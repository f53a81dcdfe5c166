//! Per-process address spaces. An address space is a run of pages starting
//! at virtual address 0, backed entirely by the process' swap store.

use super::noff::{NoffError, NoffHeader, Segment};
use crate::config::KernelConfig;
use crate::fs::FileSystem;
use crate::machine::Machine;
use crate::mem::swapping::{SwapError, SwapStore};
use crate::threading::process_table::Pid;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use log::debug;
use pagingos_shared::mem::{
    pages_for, INSTRUCTION_WIDTH, PAGE_SIZE, STACK_RESERVE, USER_STACK_SIZE,
};
use pagingos_shared::registers::{NEXT_PC_REG, NUM_TOTAL_REGS, PC_REG, STACK_REG};

/// Error type for loading an executable into a new address space
pub enum LoadError {
    /// The executable couldn't be parsed
    Image(NoffError),
    /// A segment doesn't fit within the address space
    SegmentOutOfRange { segment: &'static str },
    /// Physical memory can't hold the whole address space at once
    TooLargeForIdentityMapping {
        page_count: usize,
        num_phys_pages: usize,
    },
    /// The swap store couldn't be created or filled
    Swap(SwapError),
}

impl Debug for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::Image(err) => write!(f, "Image({err:?})"),
            LoadError::SegmentOutOfRange { segment } => {
                write!(f, "SegmentOutOfRange {{ segment: {segment:?} }}")
            }
            LoadError::TooLargeForIdentityMapping {
                page_count,
                num_phys_pages,
            } => write!(
                f,
                "TooLargeForIdentityMapping {{ page_count: {page_count}, num_phys_pages: {num_phys_pages} }}"
            ),
            LoadError::Swap(err) => write!(f, "Swap({err:?})"),
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            LoadError::Image(err) => Display::fmt(err, f),
            LoadError::SegmentOutOfRange { segment } => {
                write!(f, "{segment} segment lies outside the address space")
            }
            LoadError::TooLargeForIdentityMapping {
                page_count,
                num_phys_pages,
            } => write!(
                f,
                "{page_count} pages don't fit in {num_phys_pages} physical frames"
            ),
            LoadError::Swap(err) => Display::fmt(err, f),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Image(err) => Some(err),
            LoadError::Swap(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NoffError> for LoadError {
    fn from(err: NoffError) -> Self {
        LoadError::Image(err)
    }
}

impl From<SwapError> for LoadError {
    fn from(err: SwapError) -> Self {
        LoadError::Swap(err)
    }
}

pub struct AddrSpace {
    pid: Pid,
    page_count: usize,
    code_page_count: usize,
    swap: SwapStore,
}

impl AddrSpace {
    /// Lays out `image` in a fresh swap store named after `display_name`.
    ///
    /// The store covers every segment plus [`USER_STACK_SIZE`] bytes of
    /// stack. Code and initialized data are copied to their virtual
    /// addresses; everything else reads as zero. On failure nothing is left
    /// behind in `fs`.
    pub fn load(
        pid: Pid,
        display_name: &str,
        image: &[u8],
        fs: &mut dyn FileSystem,
        config: &KernelConfig,
    ) -> Result<AddrSpace, LoadError> {
        let header = NoffHeader::parse(image)?;
        let code = header.code.bytes(image)?;
        let init_data = header.init_data.bytes(image)?;

        let size = header.code.size as usize
            + header.init_data.size as usize
            + header.uninit_data.size as usize
            + USER_STACK_SIZE;
        let page_count = pages_for(size);
        let space_end = page_count * PAGE_SIZE;

        let segments = [
            ("code", header.code),
            ("initialized data", header.init_data),
            ("uninitialized data", header.uninit_data),
        ];
        for (segment, layout) in segments {
            if !layout.is_empty() && layout.virtual_end() > space_end {
                return Err(LoadError::SegmentOutOfRange { segment });
            }
        }
        if config.uses_tlb() && page_count > config.num_phys_pages {
            return Err(LoadError::TooLargeForIdentityMapping {
                page_count,
                num_phys_pages: config.num_phys_pages,
            });
        }

        debug!(
            "initializing address space for {display_name}, num pages {page_count}, size {space_end}"
        );
        let mut swap = SwapStore::create(fs, display_name, space_end)?;
        if let Err(err) = copy_segment(&mut swap, header.code, code)
            .and_then(|()| copy_segment(&mut swap, header.init_data, init_data))
        {
            swap.destroy(fs).ok();
            return Err(err.into());
        }

        Ok(AddrSpace {
            pid,
            page_count,
            code_page_count: pages_for(header.code.size as usize),
            swap,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        pid: Pid,
        page_count: usize,
        code_page_count: usize,
        swap: SwapStore,
    ) -> AddrSpace {
        AddrSpace {
            pid,
            page_count,
            code_page_count,
            swap,
        }
    }

    /// Sets up the registers for the first instruction of the program.
    pub fn init_registers(&self, machine: &mut Machine) {
        for reg in 0..NUM_TOTAL_REGS {
            machine.write_register(reg, 0);
        }
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, register_value(INSTRUCTION_WIDTH));

        let stack_top = self.page_count * PAGE_SIZE - STACK_RESERVE;
        machine.write_register(STACK_REG, register_value(stack_top));
        debug!("initializing stack register to {stack_top}");
    }

    /// Removes the swap store. The translation strategy must already have
    /// dropped this space's resident pages.
    pub fn teardown(self, fs: &mut dyn FileSystem) -> Result<(), SwapError> {
        self.swap.destroy(fs)
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn code_page_count(&self) -> usize {
        self.code_page_count
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    pub fn swap_mut(&mut self) -> &mut SwapStore {
        &mut self.swap
    }
}

fn copy_segment(swap: &mut SwapStore, layout: Segment, bytes: &[u8]) -> Result<(), SwapError> {
    if layout.is_empty() {
        return Ok(());
    }
    debug!(
        "initializing segment at {:#x}, size {}",
        layout.virtual_addr, layout.size
    );
    swap.write_at(bytes, layout.virtual_addr as usize)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn register_value(value: usize) -> i32 {
    value as i32
}
