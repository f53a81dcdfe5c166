#![allow(clippy::cast_possible_wrap)]

use crate::config::KernelConfig;
use crate::fs::FileSystem;
use crate::machine::Machine;
use crate::mem::swapping::SwapError;
use crate::mem::{FaultError, MemoryManager};
use crate::threading::process_table::{Pid, Process, ProcessTable};
use crate::user_program::addrspace::{AddrSpace, LoadError};
use alloc::boxed::Box;
use core::error::Error;
use core::fmt::{Arguments, Debug, Display, Formatter, Write};
use log::{error, info, warn};
use pagingos_shared::mem::PAGE_SIZE;
use pagingos_shared::registers::BAD_VADDR_REG;

/// Error type for kernel operations. Every variant except `Load`,
/// `NoSuchProcess`, `NoRunningProcess` and `PidExhausted` leaves the machine
/// halted.
pub enum KernelError {
    Load(LoadError),
    Fault(FaultError),
    Swap(SwapError),
    /// An exception the kernel has no handler for
    UnexpectedException { code: u32, syscall: i32 },
    /// A misaligned access, or one outside the address space
    AddressError { vaddr: u32 },
    /// An access still missed after its page fault was handled
    FaultLoop { vaddr: u32 },
    NoSuchProcess(Pid),
    NoRunningProcess,
    Halted,
    PidExhausted,
}

impl Debug for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::Load(err) => write!(f, "Load({err:?})"),
            KernelError::Fault(err) => write!(f, "Fault({err:?})"),
            KernelError::Swap(err) => write!(f, "Swap({err:?})"),
            KernelError::UnexpectedException { code, syscall } => write!(
                f,
                "UnexpectedException {{ code: {code}, syscall: {syscall} }}"
            ),
            KernelError::AddressError { vaddr } => write!(f, "AddressError({vaddr:#x})"),
            KernelError::FaultLoop { vaddr } => write!(f, "FaultLoop({vaddr:#x})"),
            KernelError::NoSuchProcess(pid) => write!(f, "NoSuchProcess({pid})"),
            KernelError::NoRunningProcess => write!(f, "NoRunningProcess"),
            KernelError::Halted => write!(f, "Halted"),
            KernelError::PidExhausted => write!(f, "PidExhausted"),
        }
    }
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::Load(err) => write!(f, "load failed: {err}"),
            KernelError::Fault(err) => write!(f, "page fault failed: {err}"),
            KernelError::Swap(err) => write!(f, "swap failed: {err}"),
            KernelError::UnexpectedException { code, syscall } => {
                write!(f, "unexpected user mode exception {code} {syscall}")
            }
            KernelError::AddressError { vaddr } => write!(f, "address error at {vaddr:#x}"),
            KernelError::FaultLoop { vaddr } => {
                write!(f, "access to {vaddr:#x} faults after its page was loaded")
            }
            KernelError::NoSuchProcess(pid) => write!(f, "no process {pid}"),
            KernelError::NoRunningProcess => write!(f, "no process is running"),
            KernelError::Halted => write!(f, "machine is halted"),
            KernelError::PidExhausted => write!(f, "out of process ids"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KernelError::Load(err) => Some(err),
            KernelError::Fault(err) => Some(err),
            KernelError::Swap(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LoadError> for KernelError {
    fn from(err: LoadError) -> Self {
        KernelError::Load(err)
    }
}

impl From<FaultError> for KernelError {
    fn from(err: FaultError) -> Self {
        KernelError::Fault(err)
    }
}

impl From<SwapError> for KernelError {
    fn from(err: SwapError) -> Self {
        KernelError::Swap(err)
    }
}

/// The whole simulated system: the CPU, physical memory and the processes
/// sharing it.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) machine: Machine,
    pub(crate) mm: MemoryManager,
    pub(crate) processes: ProcessTable,
    pub(crate) file_system: Box<dyn FileSystem>,
    console: Box<dyn Write>,
    pub(crate) running: Option<Pid>,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        file_system: Box<dyn FileSystem>,
        console: Box<dyn Write>,
    ) -> Kernel {
        info!(
            "{} translation with {} physical pages",
            if config.uses_tlb() { "tlb" } else { "inverted page table" },
            config.num_phys_pages
        );
        Kernel {
            mm: MemoryManager::new(&config),
            config,
            machine: Machine::new(),
            processes: ProcessTable::new(),
            file_system,
            console,
            running: None,
        }
    }

    /// Loads `image` into a new process. The process doesn't run until it is
    /// started.
    pub fn spawn(&mut self, name: &str, image: &[u8]) -> Result<Pid, KernelError> {
        let pid = self
            .processes
            .allocate_pid()
            .ok_or(KernelError::PidExhausted)?;
        let space = AddrSpace::load(pid, name, image, &mut *self.file_system, &self.config)?;
        info!("process {pid} ({name}) loaded, {} pages", space.page_count());
        self.processes.add(Process::new(name.into(), space));
        Ok(pid)
    }

    /// Switches to `pid` and points the CPU at the start of its program.
    pub fn start(&mut self, pid: Pid) -> Result<(), KernelError> {
        self.switch_to(pid)?;
        let process = self
            .processes
            .get(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        process.space.init_registers(&mut self.machine);
        Ok(())
    }

    /// Makes `pid` the running process. The outgoing process is saved
    /// completely before anything of the incoming one is restored.
    pub fn switch_to(&mut self, pid: Pid) -> Result<(), KernelError> {
        if !self.processes.contains(pid) {
            return Err(KernelError::NoSuchProcess(pid));
        }
        if self.running == Some(pid) {
            return Ok(());
        }

        if let Some(outgoing) = self.running.take() {
            if let Some(process) = self.processes.get_mut(outgoing) {
                process.save_user_state(self.machine.registers());
            }
            if let Err(err) = self.mm.save_state(&mut self.processes, outgoing) {
                return Err(self.fail(format_args!("saving process {outgoing}"), err));
            }
        }

        if let Err(err) = self.mm.restore_state(&mut self.processes, pid) {
            return Err(self.fail(format_args!("restoring process {pid}"), err));
        }
        let process = self
            .processes
            .get(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        self.machine.load_registers(process.user_registers());
        self.running = Some(pid);
        Ok(())
    }

    pub fn read_mem(&mut self, vaddr: u32, size: usize) -> Result<u32, KernelError> {
        let paddr = self.translate_with_faults(vaddr, size, false)?;
        Ok(self.mm.read(paddr, size))
    }

    pub fn write_mem(&mut self, vaddr: u32, size: usize, value: u32) -> Result<(), KernelError> {
        let paddr = self.translate_with_faults(vaddr, size, true)?;
        self.mm.write(paddr, size, value);
        Ok(())
    }

    fn translate_with_faults(
        &mut self,
        vaddr: u32,
        size: usize,
        writing: bool,
    ) -> Result<usize, KernelError> {
        if self.machine.is_halted() {
            return Err(KernelError::Halted);
        }
        let pid = self.running_pid()?;

        let page_count = self
            .processes
            .get(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?
            .space
            .page_count();
        let aligned = matches!(size, 1 | 2 | 4) && vaddr as usize % size == 0;
        if !aligned || vaddr as usize / PAGE_SIZE >= page_count {
            self.machine.write_register(BAD_VADDR_REG, vaddr as i32);
            error!("address error at {vaddr:#x} ({size} bytes) in process {pid}");
            self.machine.halt();
            return Err(KernelError::AddressError { vaddr });
        }

        match self.mm.translate(pid, vaddr, writing) {
            Ok(paddr) => return Ok(paddr),
            Err(exception) => {
                self.machine.write_register(BAD_VADDR_REG, vaddr as i32);
                self.handle_exception(exception)?;
            }
        }
        match self.mm.translate(pid, vaddr, writing) {
            Ok(paddr) => Ok(paddr),
            Err(exception) => {
                error!(
                    "access to {vaddr:#x} raised exception {} after its fault was handled",
                    exception.code()
                );
                self.machine.halt();
                Err(KernelError::FaultLoop { vaddr })
            }
        }
    }

    /// Ends `pid` with `status`, reporting the exit on the console.
    pub fn exit(&mut self, pid: Pid, status: i32) -> Result<(), KernelError> {
        if !self.processes.contains(pid) {
            return Err(KernelError::NoSuchProcess(pid));
        }

        self.print(format_args!("Exit code {status}\n"));
        if self.config.report_paging_stats {
            let stats = self.mm.stats();
            let label = self.mm.strategy_name();
            self.print(format_args!("{label}:\n"));
            self.print(format_args!(
                "miss number:{}, total number:{}\n",
                stats.misses, stats.accesses
            ));
            self.print(format_args!("miss rate:{:.6}\n", stats.miss_rate()));
        }

        self.terminate(pid)
    }

    fn terminate(&mut self, pid: Pid) -> Result<(), KernelError> {
        let process = self
            .processes
            .remove(pid)
            .ok_or(KernelError::NoSuchProcess(pid))?;
        self.mm.teardown(pid);
        if self.running == Some(pid) {
            self.running = None;
        }
        if let Err(err) = process.space.teardown(&mut *self.file_system) {
            return Err(self.fail(format_args!("tearing down process {pid}"), err));
        }
        info!("process {pid} ({}) terminated", process.name);
        Ok(())
    }

    // Physical memory and the swap stores may disagree after a failed
    // transfer, so nothing may run afterwards.
    fn fail(&mut self, action: Arguments<'_>, err: impl Into<KernelError>) -> KernelError {
        let err = err.into();
        error!("{action} failed: {err}");
        self.machine.halt();
        err
    }

    pub fn halt(&mut self) {
        info!("machine halting");
        self.machine.halt();
    }

    pub(crate) fn print(&mut self, args: Arguments<'_>) {
        if self.console.write_fmt(args).is_err() {
            warn!("console write failed");
        }
    }

    pub fn running_pid(&self) -> Result<Pid, KernelError> {
        self.running.ok_or(KernelError::NoRunningProcess)
    }

    pub fn running(&self) -> Option<Pid> {
        self.running
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.mm
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        &*self.file_system
    }
}
