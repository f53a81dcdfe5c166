//! Translation through a small, fully associative software TLB.
//!
//! Physical memory holds the running address space at its virtual layout
//! (page `n` lives in frame `n`), so a miss never has to touch the disk: it
//! only has to find the TLB a slot for the identity mapping.

use super::page_replacement::{least_recently_used, ReplacementPolicy};
use super::{
    FaultError, FaultResolution, FrameAllocator, PagingContext, ResidentMapping,
    TranslationStrategy,
};
use crate::machine::ExceptionKind;
use crate::threading::process_table::Pid;
use alloc::{vec, vec::Vec};
use log::{debug, info};
use pagingos_shared::mem::PAGE_SIZE;
use pagingos_shared::paging::VirtualAddress;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub virtual_page: usize,
    pub physical_page: usize,
    pub valid: bool,
    /// Faults since this entry was last referenced.
    pub recency: u32,
}

pub struct SoftwareTlb {
    slots: Vec<TlbEntry>,
    policy: ReplacementPolicy,
    // FIFO: the slot filled longest ago.
    next_victim: usize,
    // Whose image is laid out in physical memory right now.
    current: Option<Pid>,
}

impl SoftwareTlb {
    pub fn new(size: usize, policy: ReplacementPolicy) -> Self {
        assert!(size > 0, "a software TLB needs at least one slot");
        SoftwareTlb {
            slots: vec![TlbEntry::default(); size],
            policy,
            next_victim: 0,
            current: None,
        }
    }

    pub fn slots(&self) -> &[TlbEntry] {
        &self.slots
    }

    fn flush(&mut self) {
        self.slots.fill(TlbEntry::default());
        self.next_victim = 0;
    }

    fn choose_victim(&mut self) -> usize {
        match self.policy {
            ReplacementPolicy::Lru => least_recently_used(
                self.slots
                    .iter()
                    .enumerate()
                    .map(|(slot, entry)| (slot, entry.recency)),
            )
            .unwrap_or(0),
            ReplacementPolicy::Fifo => {
                let slot = self.next_victim;
                self.next_victim = (self.next_victim + 1) % self.slots.len();
                slot
            }
        }
    }
}

impl TranslationStrategy for SoftwareTlb {
    fn name(&self) -> &'static str {
        self.policy.label()
    }

    fn allocates_frames(&self) -> bool {
        false
    }

    fn translate(&mut self, _pid: Pid, vaddr: u32, _writing: bool) -> Result<usize, ExceptionKind> {
        let addr = VirtualAddress::from_raw(vaddr);
        let vpn = addr.vpn();
        let entry = self
            .slots
            .iter_mut()
            .find(|entry| entry.valid && entry.virtual_page == vpn)
            .ok_or(ExceptionKind::PageFault)?;
        entry.recency = 0;

        Ok(entry.physical_page * PAGE_SIZE + addr.page_offset())
    }

    fn resolve_fault(
        &mut self,
        ctx: &mut PagingContext<'_>,
        pid: Pid,
        vaddr: u32,
    ) -> Result<FaultResolution, FaultError> {
        if self.current != Some(pid) {
            return Err(FaultError::NotLoaded(pid));
        }
        let page_count = ctx
            .spaces
            .space(pid)
            .ok_or(FaultError::UnknownProcess(pid))?
            .page_count();
        let vpn = VirtualAddress::from_raw(vaddr).vpn();
        if vpn >= page_count {
            return Err(FaultError::OutOfRange { vpn, page_count });
        }

        let (slot, resolution) = match self.slots.iter().position(|entry| !entry.valid) {
            Some(slot) => (slot, FaultResolution::TlbEmptySlot { slot }),
            None => {
                let slot = self.choose_victim();
                let victim_vpn = self.slots[slot].virtual_page;
                (slot, FaultResolution::TlbEvicted { slot, victim_vpn })
            }
        };

        for (index, entry) in self.slots.iter_mut().enumerate() {
            if index != slot && entry.valid {
                entry.recency = entry.recency.saturating_add(1);
            }
        }
        self.slots[slot] = TlbEntry {
            virtual_page: vpn,
            physical_page: vpn,
            valid: true,
            recency: 0,
        };
        info!("tlb slot {slot} now maps vpn {vpn} of process {pid}");

        Ok(resolution)
    }

    fn save_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError> {
        self.flush();
        if self.current != Some(pid) {
            return Ok(());
        }
        self.current = None;

        let space = ctx.spaces.space(pid).ok_or(FaultError::UnknownProcess(pid))?;
        for vpn in 0..space.page_count() {
            space.swap_mut().write_page(vpn, ctx.memory.frame(vpn))?;
        }
        debug!("wrote {} pages of process {pid} back to swap", space.page_count());
        Ok(())
    }

    fn restore_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError> {
        self.flush();

        let space = ctx.spaces.space(pid).ok_or(FaultError::UnknownProcess(pid))?;
        let page_count = space.page_count();
        if page_count > ctx.memory.num_frames() {
            return Err(FaultError::TooLarge {
                page_count,
                num_frames: ctx.memory.num_frames(),
            });
        }
        for vpn in 0..page_count {
            space.swap().read_page(vpn, ctx.memory.frame_mut(vpn))?;
        }
        self.current = Some(pid);
        debug!("laid out {page_count} pages of process {pid}");
        Ok(())
    }

    fn teardown(&mut self, _frames: &mut FrameAllocator, pid: Pid) {
        if self.current == Some(pid) {
            self.flush();
            self.current = None;
        }
    }

    fn resident_mappings(&self) -> Vec<ResidentMapping> {
        self.slots
            .iter()
            .filter(|entry| entry.valid)
            .map(|entry| ResidentMapping {
                frame: entry.physical_page,
                owner: self.current,
                vpn: entry.virtual_page,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MainMemory;
    use crate::mem::frame_allocator::Placement;
    use crate::fs::RamFs;
    use crate::test_util::{flat_space, Spaces};

    const PID: Pid = 1;

    struct Rig {
        memory: MainMemory,
        frames: FrameAllocator,
        spaces: Spaces,
        fs: RamFs,
    }

    impl Rig {
        fn new(pages: usize) -> Self {
            let mut fs = RamFs::new();
            let mut spaces = Spaces::new();
            spaces.insert(PID, flat_space(&mut fs, PID, pages));
            Rig {
                memory: MainMemory::new(8),
                frames: FrameAllocator::new(8, Placement::FirstFit),
                spaces,
                fs,
            }
        }

        fn ctx(&mut self) -> PagingContext<'_> {
            PagingContext {
                memory: &mut self.memory,
                frames: &mut self.frames,
                spaces: &mut self.spaces,
            }
        }
    }

    fn touch(tlb: &mut SoftwareTlb, rig: &mut Rig, vpn: usize) -> Option<FaultResolution> {
        let vaddr = u32::try_from(vpn * PAGE_SIZE).unwrap();
        match tlb.translate(PID, vaddr, false) {
            Ok(_) => None,
            Err(ExceptionKind::PageFault) => {
                Some(tlb.resolve_fault(&mut rig.ctx(), PID, vaddr).unwrap())
            }
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lru_evicts_least_recently_referenced() {
        let mut rig = Rig::new(4);
        let mut tlb = SoftwareTlb::new(3, ReplacementPolicy::Lru);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();

        for vpn in 0..3 {
            assert_eq!(
                touch(&mut tlb, &mut rig, vpn),
                Some(FaultResolution::TlbEmptySlot { slot: vpn })
            );
        }
        assert_eq!(touch(&mut tlb, &mut rig, 0), None);
        assert_eq!(
            touch(&mut tlb, &mut rig, 3),
            Some(FaultResolution::TlbEvicted { slot: 1, victim_vpn: 1 })
        );
    }

    #[test]
    fn lru_tie_goes_to_lowest_slot() {
        let mut rig = Rig::new(4);
        let mut tlb = SoftwareTlb::new(2, ReplacementPolicy::Lru);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();

        touch(&mut tlb, &mut rig, 0);
        touch(&mut tlb, &mut rig, 1);
        // Both referenced since their last fault.
        touch(&mut tlb, &mut rig, 0);
        touch(&mut tlb, &mut rig, 1);
        assert_eq!(
            touch(&mut tlb, &mut rig, 3),
            Some(FaultResolution::TlbEvicted { slot: 0, victim_vpn: 0 })
        );
    }

    #[test]
    fn fifo_ignores_references() {
        let mut rig = Rig::new(4);
        let mut tlb = SoftwareTlb::new(2, ReplacementPolicy::Fifo);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();

        touch(&mut tlb, &mut rig, 0);
        touch(&mut tlb, &mut rig, 1);
        touch(&mut tlb, &mut rig, 0);
        assert_eq!(
            touch(&mut tlb, &mut rig, 2),
            Some(FaultResolution::TlbEvicted { slot: 0, victim_vpn: 0 })
        );
        assert_eq!(
            touch(&mut tlb, &mut rig, 3),
            Some(FaultResolution::TlbEvicted { slot: 1, victim_vpn: 1 })
        );
        assert_eq!(
            touch(&mut tlb, &mut rig, 0),
            Some(FaultResolution::TlbEvicted { slot: 0, victim_vpn: 2 })
        );
    }

    #[test]
    fn faults_age_other_entries() {
        let mut rig = Rig::new(4);
        let mut tlb = SoftwareTlb::new(4, ReplacementPolicy::Lru);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();

        for vpn in 0..3 {
            touch(&mut tlb, &mut rig, vpn);
        }
        let recencies: Vec<u32> = tlb.slots().iter().map(|entry| entry.recency).collect();
        assert_eq!(recencies, [2, 1, 0, 0]);
        assert!(!tlb.slots()[3].valid);
    }

    #[test]
    fn switching_out_flushes_and_writes_back() {
        let mut rig = Rig::new(2);
        let mut tlb = SoftwareTlb::new(2, ReplacementPolicy::Lru);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();
        touch(&mut tlb, &mut rig, 1);
        rig.memory.write(PAGE_SIZE + 3, 1, 0x5A);

        tlb.save_state(&mut rig.ctx(), PID).unwrap();
        assert!(tlb.slots().iter().all(|entry| !entry.valid));
        assert!(tlb.resident_mappings().is_empty());

        rig.memory.write(PAGE_SIZE + 3, 1, 0);
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();
        assert_eq!(rig.memory.read(PAGE_SIZE + 3, 1), 0x5A);
        assert_eq!(rig.frames.free_count(), 8);
        assert_eq!(rig.fs.file_count(), 1);
    }

    #[test]
    fn faults_outside_the_space_fail() {
        let mut rig = Rig::new(2);
        let mut tlb = SoftwareTlb::new(2, ReplacementPolicy::Lru);
        assert!(matches!(
            tlb.resolve_fault(&mut rig.ctx(), PID, 0),
            Err(FaultError::NotLoaded(PID))
        ));
        tlb.restore_state(&mut rig.ctx(), PID).unwrap();
        let vaddr = u32::try_from(5 * PAGE_SIZE).unwrap();
        assert!(matches!(
            tlb.resolve_fault(&mut rig.ctx(), PID, vaddr),
            Err(FaultError::OutOfRange { vpn: 5, page_count: 2 })
        ));
    }

    #[test]
    fn restore_rejects_spaces_larger_than_memory() {
        let mut rig = Rig::new(9);
        let mut tlb = SoftwareTlb::new(2, ReplacementPolicy::Fifo);
        assert!(matches!(
            tlb.restore_state(&mut rig.ctx(), PID),
            Err(FaultError::TooLarge {
                page_count: 9,
                num_frames: 8
            })
        ));
        assert!(matches!(
            tlb.resolve_fault(&mut rig.ctx(), PID, 0),
            Err(FaultError::NotLoaded(PID))
        ));
    }
}
