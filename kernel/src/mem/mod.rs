pub mod frame_allocator;
pub mod inverted;
pub mod page_replacement;
pub mod swapping;
pub mod tlb;

use crate::config::{KernelConfig, TranslationMode};
use crate::machine::{ExceptionKind, MainMemory};
use crate::threading::process_table::Pid;
use crate::user_program::addrspace::AddrSpace;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::{vec, vec::Vec};
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use frame_allocator::FrameAllocator;
use inverted::InvertedPageTable;
use swapping::SwapError;
use tlb::SoftwareTlb;

/// Looks up the address space of a live process.
pub trait AddressSpaces {
    fn space(&mut self, pid: Pid) -> Option<&mut AddrSpace>;
}

impl AddressSpaces for BTreeMap<Pid, AddrSpace> {
    fn space(&mut self, pid: Pid) -> Option<&mut AddrSpace> {
        self.get_mut(&pid)
    }
}

/// Everything a translation strategy may touch while it works.
pub struct PagingContext<'a> {
    pub memory: &'a mut MainMemory,
    pub frames: &'a mut FrameAllocator,
    pub spaces: &'a mut dyn AddressSpaces,
}

/// How a page fault was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultResolution {
    /// The TLB had an unused slot.
    TlbEmptySlot { slot: usize },
    /// The TLB was full and gave up the mapping of `victim_vpn`.
    TlbEvicted { slot: usize, victim_vpn: usize },
    /// A free frame took the page.
    FrameAvailable { frame: usize },
    /// Physical memory was full. The frame was taken from `victim_owner`,
    /// whose page went back to its swap store first if it was dirty.
    FrameReclaimed {
        frame: usize,
        victim_owner: Pid,
        victim_vpn: usize,
        written_back: bool,
    },
}

/// A valid mapping held by a translation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResidentMapping {
    pub frame: usize,
    pub owner: Option<Pid>,
    pub vpn: usize,
}

/// Error type for fault handling and context switches
pub enum FaultError {
    /// No address space is registered for this process
    UnknownProcess(Pid),
    /// The process' pages aren't laid out in physical memory
    NotLoaded(Pid),
    /// The page lies outside the address space
    OutOfRange { vpn: usize, page_count: usize },
    /// The space has more pages than physical memory has frames
    TooLarge { page_count: usize, num_frames: usize },
    /// Physical memory has no frame that could take the page
    NoEvictableFrame,
    /// Moving a page to or from the swap store failed
    Swap(SwapError),
}

impl Debug for FaultError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            FaultError::UnknownProcess(pid) => write!(f, "UnknownProcess({pid})"),
            FaultError::NotLoaded(pid) => write!(f, "NotLoaded({pid})"),
            FaultError::OutOfRange { vpn, page_count } => {
                write!(f, "OutOfRange {{ vpn: {vpn}, page_count: {page_count} }}")
            }
            FaultError::TooLarge {
                page_count,
                num_frames,
            } => write!(
                f,
                "TooLarge {{ page_count: {page_count}, num_frames: {num_frames} }}"
            ),
            FaultError::NoEvictableFrame => write!(f, "NoEvictableFrame"),
            FaultError::Swap(err) => write!(f, "Swap({err:?})"),
        }
    }
}

impl Display for FaultError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            FaultError::UnknownProcess(pid) => write!(f, "no address space for process {pid}"),
            FaultError::NotLoaded(pid) => {
                write!(f, "process {pid} is not laid out in physical memory")
            }
            FaultError::OutOfRange { vpn, page_count } => write!(
                f,
                "virtual page {vpn} is outside an address space of {page_count} pages"
            ),
            FaultError::TooLarge {
                page_count,
                num_frames,
            } => write!(
                f,
                "{page_count} pages don't fit in {num_frames} physical frames"
            ),
            FaultError::NoEvictableFrame => write!(f, "no physical frame can take the page"),
            FaultError::Swap(err) => write!(f, "swap failed: {err}"),
        }
    }
}

impl Error for FaultError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FaultError::Swap(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SwapError> for FaultError {
    fn from(err: SwapError) -> Self {
        FaultError::Swap(err)
    }
}

/// Turns virtual addresses into physical ones and brings missing pages in.
pub trait TranslationStrategy {
    /// Label used when reporting paging statistics.
    fn name(&self) -> &'static str;

    /// Whether mappings hold frames handed out by the frame allocator.
    fn allocates_frames(&self) -> bool;

    /// Returns the physical address of `vaddr`, or the exception the access
    /// raises.
    fn translate(&mut self, pid: Pid, vaddr: u32, writing: bool) -> Result<usize, ExceptionKind>;

    /// Makes the page holding `vaddr` resident, so that retrying the access
    /// succeeds.
    fn resolve_fault(
        &mut self,
        ctx: &mut PagingContext<'_>,
        pid: Pid,
        vaddr: u32,
    ) -> Result<FaultResolution, FaultError>;

    /// Called when `pid` stops running.
    fn save_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError>;

    /// Called when `pid` is about to run.
    fn restore_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError>;

    /// Drops whatever `pid` still has resident. Safe to call more than once.
    fn teardown(&mut self, frames: &mut FrameAllocator, pid: Pid);

    fn resident_mappings(&self) -> Vec<ResidentMapping>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PagingStats {
    pub accesses: u64,
    pub misses: u64,
}

impl PagingStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn miss_rate(&self) -> f64 {
        if self.accesses == 0 {
            return 0.0;
        }
        self.misses as f64 / self.accesses as f64
    }
}

/// Ways the resident mappings can disagree with the frame allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipViolation {
    FrameOutOfRange { frame: usize },
    SharedFrame { frame: usize },
    UnallocatedFrame { frame: usize },
    TooManyMappings { mappings: usize, frames: usize },
}

impl Display for OwnershipViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            OwnershipViolation::FrameOutOfRange { frame } => {
                write!(f, "mapping to nonexistent frame {frame}")
            }
            OwnershipViolation::SharedFrame { frame } => {
                write!(f, "frame {frame} is mapped more than once")
            }
            OwnershipViolation::UnallocatedFrame { frame } => {
                write!(f, "frame {frame} is mapped but free")
            }
            OwnershipViolation::TooManyMappings { mappings, frames } => {
                write!(f, "{mappings} mappings for {frames} frames")
            }
        }
    }
}

impl Error for OwnershipViolation {}

/// Physical memory, its frames and the strategy that maps pages onto them.
pub struct MemoryManager {
    memory: MainMemory,
    frames: FrameAllocator,
    strategy: Box<dyn TranslationStrategy>,
    stats: PagingStats,
}

impl MemoryManager {
    pub fn new(config: &KernelConfig) -> Self {
        let strategy: Box<dyn TranslationStrategy> = match config.translation {
            TranslationMode::SoftwareTlb(policy) => {
                Box::new(SoftwareTlb::new(config.tlb_size, policy))
            }
            TranslationMode::InvertedPageTable => {
                Box::new(InvertedPageTable::new(config.num_phys_pages))
            }
        };

        MemoryManager {
            memory: MainMemory::new(config.num_phys_pages),
            frames: FrameAllocator::new(config.num_phys_pages, config.placement),
            strategy,
            stats: PagingStats::default(),
        }
    }

    /// Translates one access by `pid`. Every call counts as an access, and
    /// every page fault as a miss.
    pub fn translate(
        &mut self,
        pid: Pid,
        vaddr: u32,
        writing: bool,
    ) -> Result<usize, ExceptionKind> {
        self.stats.accesses += 1;
        let result = self.strategy.translate(pid, vaddr, writing);
        if result == Err(ExceptionKind::PageFault) {
            self.stats.misses += 1;
        }
        result
    }

    pub fn handle_page_fault(
        &mut self,
        spaces: &mut dyn AddressSpaces,
        pid: Pid,
        vaddr: u32,
    ) -> Result<FaultResolution, FaultError> {
        let mut ctx = PagingContext {
            memory: &mut self.memory,
            frames: &mut self.frames,
            spaces,
        };
        self.strategy.resolve_fault(&mut ctx, pid, vaddr)
    }

    pub fn save_state(
        &mut self,
        spaces: &mut dyn AddressSpaces,
        pid: Pid,
    ) -> Result<(), FaultError> {
        let mut ctx = PagingContext {
            memory: &mut self.memory,
            frames: &mut self.frames,
            spaces,
        };
        self.strategy.save_state(&mut ctx, pid)
    }

    pub fn restore_state(
        &mut self,
        spaces: &mut dyn AddressSpaces,
        pid: Pid,
    ) -> Result<(), FaultError> {
        let mut ctx = PagingContext {
            memory: &mut self.memory,
            frames: &mut self.frames,
            spaces,
        };
        self.strategy.restore_state(&mut ctx, pid)
    }

    pub fn teardown(&mut self, pid: Pid) {
        self.strategy.teardown(&mut self.frames, pid);
    }

    pub fn read(&self, paddr: usize, size: usize) -> u32 {
        self.memory.read(paddr, size)
    }

    pub fn write(&mut self, paddr: usize, size: usize, value: u32) {
        self.memory.write(paddr, size, value);
    }

    pub fn stats(&self) -> PagingStats {
        self.stats
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn memory(&self) -> &MainMemory {
        &self.memory
    }

    pub fn resident_mappings(&self) -> Vec<ResidentMapping> {
        self.strategy.resident_mappings()
    }

    /// Checks that no frame is mapped twice, and that every frame mapped by
    /// a strategy that allocates frames is actually allocated.
    pub fn check_frame_ownership(&self) -> Result<(), OwnershipViolation> {
        let mappings = self.strategy.resident_mappings();
        let num_frames = self.memory.num_frames();
        if mappings.len() > num_frames {
            return Err(OwnershipViolation::TooManyMappings {
                mappings: mappings.len(),
                frames: num_frames,
            });
        }

        let mut seen = vec![false; num_frames];
        for mapping in &mappings {
            let frame = mapping.frame;
            match seen.get_mut(frame) {
                None => return Err(OwnershipViolation::FrameOutOfRange { frame }),
                Some(true) => return Err(OwnershipViolation::SharedFrame { frame }),
                Some(slot) => *slot = true,
            }
            if self.strategy.allocates_frames() && !self.frames.is_allocated(frame) {
                return Err(OwnershipViolation::UnallocatedFrame { frame });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::RamFs;
    use crate::mem::page_replacement::ReplacementPolicy;
    use crate::test_util::{flat_space, Spaces};
    use pagingos_shared::mem::PAGE_SIZE;

    fn vaddr(vpn: usize, offset: usize) -> u32 {
        u32::try_from(vpn * PAGE_SIZE + offset).unwrap()
    }

    #[test]
    fn misses_are_counted_once_per_fault() {
        let config = KernelConfig::default()
            .with_translation(TranslationMode::InvertedPageTable)
            .with_phys_pages(4);
        let mut mm = MemoryManager::new(&config);
        let mut fs = RamFs::new();
        let mut spaces = Spaces::new();
        spaces.insert(1, flat_space(&mut fs, 1, 2));

        assert_eq!(mm.translate(1, vaddr(1, 3), false), Err(ExceptionKind::PageFault));
        mm.handle_page_fault(&mut spaces, 1, vaddr(1, 3)).unwrap();
        let paddr = mm.translate(1, vaddr(1, 3), true).unwrap();
        mm.write(paddr, 4, 0xDEAD_BEEF);
        let paddr = mm.translate(1, vaddr(1, 3), false).unwrap();
        assert_eq!(mm.read(paddr, 4), 0xDEAD_BEEF);

        assert_eq!(mm.stats(), PagingStats { accesses: 3, misses: 1 });
        assert!((mm.stats().miss_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(mm.strategy_name(), "LRU");
        mm.check_frame_ownership().unwrap();
    }

    #[test]
    fn empty_stats_have_no_miss_rate() {
        assert_eq!(PagingStats::default().miss_rate(), 0.0);
    }

    #[test]
    fn tlb_strategy_is_labelled_by_policy() {
        let config = KernelConfig::default()
            .with_translation(TranslationMode::SoftwareTlb(ReplacementPolicy::Fifo));
        let mm = MemoryManager::new(&config);
        assert_eq!(mm.strategy_name(), "FIFO");
        assert_eq!(mm.frames().free_count(), config.num_phys_pages);
    }

    #[test]
    fn teardown_frees_frames() {
        let config = KernelConfig::default()
            .with_translation(TranslationMode::InvertedPageTable)
            .with_phys_pages(2);
        let mut mm = MemoryManager::new(&config);
        let mut fs = RamFs::new();
        let mut spaces = Spaces::new();
        spaces.insert(3, flat_space(&mut fs, 3, 2));

        mm.handle_page_fault(&mut spaces, 3, vaddr(0, 0)).unwrap();
        mm.handle_page_fault(&mut spaces, 3, vaddr(1, 0)).unwrap();
        assert_eq!(mm.frames().free_count(), 0);

        mm.teardown(3);
        assert_eq!(mm.frames().free_count(), 2);
        assert!(mm.resident_mappings().is_empty());
    }
}
