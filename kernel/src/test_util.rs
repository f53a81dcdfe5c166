//! Builders for address spaces of an exact shape, bypassing the loader.

use crate::fs::FileSystem;
use crate::mem::swapping::SwapStore;
use crate::threading::process_table::Pid;
use crate::user_program::addrspace::AddrSpace;
use alloc::collections::BTreeMap;
use alloc::format;
use pagingos_shared::mem::{pages_for, PAGE_SIZE};

pub type Spaces = BTreeMap<Pid, AddrSpace>;

/// An all-zero address space of `pages` pages with no code.
pub fn flat_space(fs: &mut dyn FileSystem, pid: Pid, pages: usize) -> AddrSpace {
    let swap = SwapStore::create(fs, &format!("flat{pid}"), pages * PAGE_SIZE).unwrap();
    AddrSpace::from_parts(pid, pages, 0, swap)
}

/// `code` at virtual address 0, followed by `extra_pages` zero pages.
pub fn space_with_code(
    fs: &mut dyn FileSystem,
    pid: Pid,
    code: &[u8],
    extra_pages: usize,
) -> AddrSpace {
    let code_pages = pages_for(code.len());
    let pages = code_pages + extra_pages;
    let mut swap = SwapStore::create(fs, &format!("code{pid}"), pages * PAGE_SIZE).unwrap();
    swap.write_at(code, 0).unwrap();
    AddrSpace::from_parts(pid, pages, code_pages, swap)
}
