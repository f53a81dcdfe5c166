//! Register numbering of the simulated MIPS CPU.

pub const STACK_REG: usize = 29;
pub const PC_REG: usize = 34;
pub const NEXT_PC_REG: usize = 35;
pub const PREV_PC_REG: usize = 36;
// Holds the faulting virtual address when an exception is raised.
pub const BAD_VADDR_REG: usize = 39;

pub const NUM_TOTAL_REGS: usize = 40;
