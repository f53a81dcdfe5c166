//! Entry point for every exception raised by user code.

#![allow(clippy::cast_sign_loss)]

use crate::machine::ExceptionKind;
use crate::system::{Kernel, KernelError};
use log::{debug, error, info, warn};
use pagingos_shared::mem::INSTRUCTION_WIDTH;
use pagingos_shared::registers::{BAD_VADDR_REG, NEXT_PC_REG, PC_REG, PREV_PC_REG};
use pagingos_syscalls::{SYSCALL_ARG0_REG, SYSCALL_CODE_REG, SYS_EXIT, SYS_HALT};

impl Kernel {
    /// Handles an exception raised by the running process.
    ///
    /// System calls go to their handler and page faults are resolved at the
    /// address in the `BadVAddr` register. Anything else is fatal: the
    /// machine halts and the error names the exception.
    pub fn handle_exception(&mut self, kind: ExceptionKind) -> Result<(), KernelError> {
        match kind {
            ExceptionKind::Syscall => self.handle_syscall(),
            ExceptionKind::PageFault => {
                let pid = self.running_pid()?;
                let vaddr = self.machine.read_register(BAD_VADDR_REG) as u32;
                match self.mm.handle_page_fault(&mut self.processes, pid, vaddr) {
                    Ok(resolution) => {
                        debug!("page fault at {vaddr:#x} in process {pid}: {resolution:?}");
                        Ok(())
                    }
                    Err(err) => {
                        error!("page fault at {vaddr:#x} in process {pid} failed: {err}");
                        self.machine.halt();
                        Err(err.into())
                    }
                }
            }
            ExceptionKind::Other(code) => {
                let syscall = self.machine.read_register(SYSCALL_CODE_REG);
                error!("Unexpected user mode exception {code} {syscall}");
                self.machine.halt();
                Err(KernelError::UnexpectedException { code, syscall })
            }
        }
    }

    fn handle_syscall(&mut self) -> Result<(), KernelError> {
        let code = self.machine.read_register(SYSCALL_CODE_REG);
        match usize::try_from(code) {
            Ok(SYS_HALT) => {
                info!("Shutdown, initiated by user program.");
                self.halt();
                Ok(())
            }
            Ok(SYS_EXIT) => {
                let pid = self.running_pid()?;
                let status = self.machine.read_register(SYSCALL_ARG0_REG);
                self.exit(pid, status)
            }
            _ => {
                warn!("unknown syscall {code} ignored");
                self.advance_pc();
                Ok(())
            }
        }
    }

    /// Moves past the instruction that trapped, so the program doesn't
    /// trap again when it resumes.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub(crate) fn advance_pc(&mut self) {
        let pc = self.machine.read_register(PC_REG);
        let next_pc = self.machine.read_register(NEXT_PC_REG);
        self.machine.write_register(PREV_PC_REG, pc);
        self.machine.write_register(PC_REG, next_pc);
        self.machine.write_register(
            NEXT_PC_REG,
            next_pc.wrapping_add(INSTRUCTION_WIDTH as i32),
        );
    }
}
