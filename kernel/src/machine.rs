//! The slice of the simulated machine that paging touches: the register file
//! and main memory.

use alloc::{vec, vec::Vec};
use pagingos_shared::{mem::PAGE_SIZE, registers::NUM_TOTAL_REGS};

/// Why control entered the kernel from user mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    Syscall,
    PageFault,
    /// Any other exception, by its CPU exception number.
    Other(u32),
}

// Exception numbers as the simulated CPU reports them.
pub const SYSCALL_EXCEPTION: u32 = 1;
pub const PAGE_FAULT_EXCEPTION: u32 = 2;
pub const READ_ONLY_EXCEPTION: u32 = 3;
pub const BUS_ERROR_EXCEPTION: u32 = 4;
pub const ADDRESS_ERROR_EXCEPTION: u32 = 5;

impl ExceptionKind {
    pub fn code(&self) -> u32 {
        match self {
            ExceptionKind::Syscall => SYSCALL_EXCEPTION,
            ExceptionKind::PageFault => PAGE_FAULT_EXCEPTION,
            ExceptionKind::Other(code) => *code,
        }
    }
}

pub type Registers = [i32; NUM_TOTAL_REGS];

pub struct Machine {
    registers: Registers,
    halted: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub const fn new() -> Self {
        Self {
            registers: [0; NUM_TOTAL_REGS],
            halted: false,
        }
    }

    pub fn read_register(&self, reg: usize) -> i32 {
        self.registers[reg]
    }

    pub fn write_register(&mut self, reg: usize, value: i32) {
        self.registers[reg] = value;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn load_registers(&mut self, registers: &Registers) {
        self.registers = *registers;
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

/// Physical memory, divided into `PAGE_SIZE` frames.
pub struct MainMemory {
    bytes: Vec<u8>,
}

impl MainMemory {
    pub fn new(num_frames: usize) -> Self {
        Self {
            bytes: vec![0; num_frames * PAGE_SIZE],
        }
    }

    pub fn num_frames(&self) -> usize {
        self.bytes.len() / PAGE_SIZE
    }

    pub fn frame(&self, frame: usize) -> &[u8] {
        &self.bytes[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    pub fn frame_mut(&mut self, frame: usize) -> &mut [u8] {
        &mut self.bytes[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    /// Reads a little-endian value of `size` (1, 2 or 4) bytes.
    pub fn read(&self, paddr: usize, size: usize) -> u32 {
        let mut word = [0; 4];
        word[..size].copy_from_slice(&self.bytes[paddr..paddr + size]);
        u32::from_le_bytes(word)
    }

    /// Writes the low `size` (1, 2 or 4) bytes of `value`, little-endian.
    pub fn write(&mut self, paddr: usize, size: usize, value: u32) {
        self.bytes[paddr..paddr + size].copy_from_slice(&value.to_le_bytes()[..size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_little_endian() {
        let mut memory = MainMemory::new(2);
        memory.write(PAGE_SIZE, 4, 0x1122_3344);
        assert_eq!(memory.frame(1)[..4], [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(memory.read(PAGE_SIZE, 2), 0x3344);
        assert_eq!(memory.read(PAGE_SIZE + 3, 1), 0x11);

        memory.write(PAGE_SIZE, 1, 0xFFFF_FFAA);
        assert_eq!(memory.read(PAGE_SIZE, 4), 0x1122_33AA);
    }

    #[test]
    fn exception_codes() {
        assert_eq!(ExceptionKind::Syscall.code(), SYSCALL_EXCEPTION);
        assert_eq!(ExceptionKind::PageFault.code(), PAGE_FAULT_EXCEPTION);
        assert_eq!(
            ExceptionKind::Other(ADDRESS_ERROR_EXCEPTION).code(),
            ADDRESS_ERROR_EXCEPTION
        );
    }
}
