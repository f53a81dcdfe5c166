//! System call interface between user programs and the kernel.
//!
//! User programs place the call code in [`SYSCALL_CODE_REG`] and the
//! arguments in [`SYSCALL_ARG0_REG`] onwards, then trap. The return value, if any,
//! comes back in [`SYSCALL_CODE_REG`].
#![no_std]

pub mod defs;

pub use defs::*;
