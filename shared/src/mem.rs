use crate::sizes::{KB, SECTOR_SIZE};

// A page is exactly one disk sector, so a page moves to and from swap in a
// single transfer.
pub const PAGE_SIZE: usize = SECTOR_SIZE;

// The virtual address layout in `paging` hard-codes the offset width.
const _: () = assert!(PAGE_SIZE == 1 << crate::paging::PAGE_SHIFT);

pub const NUM_PHYS_PAGES: usize = 32;

pub const TLB_SIZE: usize = 4;

// Space reserved past the end of the loaded segments for the user stack.
pub const USER_STACK_SIZE: usize = KB;

// The initial stack pointer sits this far below the top of the address space
// so that the first push can't reference off the end.
pub const STACK_RESERVE: usize = 16;

pub const INSTRUCTION_WIDTH: usize = 4;

/// Number of pages needed to hold `size` bytes.
pub const fn pages_for(size: usize) -> usize {
    size.div_ceil(PAGE_SIZE)
}
