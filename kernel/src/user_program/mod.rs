pub mod addrspace;
pub mod exception;
pub mod noff;
