use crate::machine::Registers;
use crate::mem::AddressSpaces;
use crate::user_program::addrspace::AddrSpace;
use alloc::collections::BTreeMap;
use alloc::string::String;
use pagingos_shared::registers::NUM_TOTAL_REGS;

pub type Pid = u16;

/// A user program: its address space and, while it isn't running, its
/// registers.
pub struct Process {
    pub pid: Pid,
    pub name: String,
    pub space: AddrSpace,
    user_registers: Registers,
}

impl Process {
    pub fn new(name: String, space: AddrSpace) -> Process {
        Process {
            pid: space.pid(),
            name,
            space,
            user_registers: [0; NUM_TOTAL_REGS],
        }
    }

    pub fn save_user_state(&mut self, registers: &Registers) {
        self.user_registers = *registers;
    }

    pub fn user_registers(&self) -> &Registers {
        &self.user_registers
    }
}

pub struct ProcessTable {
    table: BTreeMap<Pid, Process>,
    next_pid: Pid,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> ProcessTable {
        ProcessTable {
            table: BTreeMap::new(),
            next_pid: 1,
        }
    }

    /// Hands out pids in increasing order, starting at 1. Pids are never
    /// reused.
    pub fn allocate_pid(&mut self) -> Option<Pid> {
        let pid = self.next_pid;
        self.next_pid = pid.checked_add(1)?;
        Some(pid)
    }

    pub fn add(&mut self, process: Process) {
        assert!(
            !self.table.contains_key(&process.pid),
            "Process with pid {} already added to process table.",
            process.pid
        );
        self.table.insert(process.pid, process);
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Process> {
        self.table.remove(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.table.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.table.get_mut(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.table.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl AddressSpaces for ProcessTable {
    fn space(&mut self, pid: Pid) -> Option<&mut AddrSpace> {
        self.get_mut(pid).map(|process| &mut process.space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamFs;
    use crate::test_util::flat_space;

    #[test]
    fn pids_start_at_one_and_increase() {
        let mut table = ProcessTable::new();
        assert_eq!(table.allocate_pid(), Some(1));
        assert_eq!(table.allocate_pid(), Some(2));
    }

    #[test]
    fn pids_run_out() {
        let mut table = ProcessTable::new();
        table.next_pid = Pid::MAX;
        assert_eq!(table.allocate_pid(), None);
    }

    #[test]
    fn spaces_are_found_by_pid() {
        let mut fs = RamFs::new();
        let mut table = ProcessTable::new();
        let pid = table.allocate_pid().unwrap();
        table.add(Process::new("p".into(), flat_space(&mut fs, pid, 3)));

        assert!(table.contains(pid));
        assert_eq!(table.space(pid).map(|space| space.page_count()), Some(3));
        assert!(table.space(pid + 1).is_none());
        assert!(table.remove(pid).is_some());
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "already added")]
    fn duplicate_pids_are_rejected() {
        let mut fs = RamFs::new();
        let mut table = ProcessTable::new();
        table.add(Process::new("a".into(), flat_space(&mut fs, 4, 1)));
        let mut other = RamFs::new();
        table.add(Process::new("b".into(), flat_space(&mut other, 4, 1)));
    }
}
