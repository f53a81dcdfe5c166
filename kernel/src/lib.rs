#![cfg_attr(target_os = "none", no_std)]

//! Demand-paged virtual memory for a teaching kernel.
//!
//! Every process gets its own swap file holding its whole image. Pages are
//! brought into physical frames on demand, either through a small software
//! TLB (LRU or FIFO replacement) or through one inverted page table shared by
//! all processes, selected by [`KernelConfig`].

extern crate alloc;

pub mod config;
pub mod fs;
pub mod machine;
pub mod mem;
pub mod system;
pub mod threading;
pub mod user_program;

#[cfg(test)]
mod test_util;

pub use config::{KernelConfig, TranslationMode};
pub use mem::page_replacement::ReplacementPolicy;
pub use system::{Kernel, KernelError};
