// syscall constants
// These are in a separate file so that both the kernel and the C user library
// (through the generated header) agree on them.

pub const SYS_HALT: usize = 0x0;
pub const SYS_EXIT: usize = 0x1;

pub const SYSCALL_CODE_REG: usize = 2;
pub const SYSCALL_ARG0_REG: usize = 4;
pub const SYSCALL_ARG1_REG: usize = 5;
pub const SYSCALL_ARG2_REG: usize = 6;
pub const SYSCALL_ARG3_REG: usize = 7;
