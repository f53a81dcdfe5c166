use arbitrary_int::{u25, u7};
use bitbybit::bitfield;

pub const PAGE_SHIFT: usize = 7;

/// Per-mapping status bits shared by page table entries of every kind.
#[bitfield(u8, default = 0)]
pub struct EntryFlags {
    #[bit(0, rw)]
    valid: bool,
    #[bit(1, rw)]
    read_only: bool,
    // Set by the hardware whenever the page is referenced.
    #[bit(2, rw)]
    use_bit: bool,
    // Set by the hardware whenever the page is written.
    #[bit(3, rw)]
    dirty: bool,
    // Pinned for the lifetime of the address space, never chosen for eviction.
    #[bit(4, rw)]
    no_swap: bool,
}

#[bitfield(u32)]
pub struct VirtualAddress {
    #[bits(7..=31, r)]
    page_number: u25,
    #[bits(0..=6, r)]
    offset: u7,
}

impl VirtualAddress {
    pub fn from_raw(addr: u32) -> Self {
        Self::new_with_raw_value(addr)
    }

    pub fn vpn(&self) -> usize {
        self.page_number().value() as usize
    }

    pub fn page_offset(&self) -> usize {
        usize::from(self.offset().value())
    }
}
