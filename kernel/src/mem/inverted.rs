//! One page table for the whole machine, indexed by physical frame. Entries
//! are tagged with the owning process, so pages of every process compete
//! for the same frames.

use super::frame_allocator::FrameExhausted;
use super::page_replacement::least_recently_used;
use super::{
    FaultError, FaultResolution, FrameAllocator, PagingContext, ResidentMapping,
    TranslationStrategy,
};
use crate::machine::{ExceptionKind, READ_ONLY_EXCEPTION};
use crate::threading::process_table::Pid;
use alloc::{boxed::Box, vec::Vec};
use log::{debug, info, warn};
use pagingos_shared::mem::PAGE_SIZE;
use pagingos_shared::paging::{EntryFlags, VirtualAddress};

#[derive(Clone, Copy)]
pub struct PageTableEntry {
    pub virtual_page: usize,
    pub physical_page: usize,
    pub flags: EntryFlags,
    pub owner: Pid,
    /// Faults since this entry was last referenced.
    pub recency: u32,
}

impl PageTableEntry {
    const fn empty(frame: usize) -> Self {
        PageTableEntry {
            virtual_page: 0,
            physical_page: frame,
            flags: EntryFlags::DEFAULT,
            owner: 0,
            recency: 0,
        }
    }

    fn maps(&self, pid: Pid, vpn: usize) -> bool {
        self.flags.valid() && self.owner == pid && self.virtual_page == vpn
    }

    fn belongs_to(&self, pid: Pid) -> bool {
        self.flags.valid() && self.owner == pid
    }
}

pub struct InvertedPageTable {
    entries: Box<[PageTableEntry]>,
}

impl InvertedPageTable {
    pub fn new(num_frames: usize) -> Self {
        InvertedPageTable {
            entries: (0..num_frames)
                .map(PageTableEntry::empty)
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    pub fn entries(&self) -> &[PageTableEntry] {
        &self.entries
    }

    fn lookup(&self, pid: Pid, vpn: usize) -> Option<usize> {
        self.entries.iter().position(|entry| entry.maps(pid, vpn))
    }

    fn least_recent(&self, include_pinned: bool) -> Option<usize> {
        least_recently_used(
            self.entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| {
                    entry.flags.valid() && (include_pinned || !entry.flags.no_swap())
                })
                .map(|(frame, entry)| (frame, entry.recency)),
        )
    }

    // Pinned pages are skipped while anything else is resident. Once every
    // frame is pinned, the oldest pinned page goes and is faulted back in on
    // demand like any other page.
    fn choose_victim(&self) -> Option<usize> {
        self.least_recent(false).or_else(|| {
            let frame = self.least_recent(true)?;
            warn!("every frame is pinned, unpinning frame {frame}");
            Some(frame)
        })
    }

    // Takes `frame` away from its current owner, saving the page first if it
    // was written. The frame stays allocated.
    fn evict(&mut self, ctx: &mut PagingContext<'_>, frame: usize) -> Result<bool, FaultError> {
        let victim = self.entries[frame];
        let written_back = victim.flags.dirty();
        if written_back {
            let owner = ctx
                .spaces
                .space(victim.owner)
                .ok_or(FaultError::UnknownProcess(victim.owner))?;
            owner
                .swap_mut()
                .write_page(victim.virtual_page, ctx.memory.frame(frame))?;
        }
        self.entries[frame].flags = EntryFlags::DEFAULT;
        Ok(written_back)
    }

    // Pinned pages are preloaded rather than referenced, so they start unused.
    fn install(&mut self, frame: usize, pid: Pid, vpn: usize, pinned: bool) {
        self.entries[frame] = PageTableEntry {
            virtual_page: vpn,
            physical_page: frame,
            flags: EntryFlags::DEFAULT
                .with_valid(true)
                .with_use_bit(!pinned)
                .with_no_swap(pinned),
            owner: pid,
            recency: 0,
        };
    }
}

impl TranslationStrategy for InvertedPageTable {
    fn name(&self) -> &'static str {
        "LRU"
    }

    fn allocates_frames(&self) -> bool {
        true
    }

    fn translate(&mut self, pid: Pid, vaddr: u32, writing: bool) -> Result<usize, ExceptionKind> {
        let addr = VirtualAddress::from_raw(vaddr);
        let frame = self
            .lookup(pid, addr.vpn())
            .ok_or(ExceptionKind::PageFault)?;
        let entry = &mut self.entries[frame];
        if writing && entry.flags.read_only() {
            return Err(ExceptionKind::Other(READ_ONLY_EXCEPTION));
        }

        let mut flags = entry.flags.with_use_bit(true);
        if writing {
            flags = flags.with_dirty(true);
        }
        entry.flags = flags;
        entry.recency = 0;

        Ok(frame * PAGE_SIZE + addr.page_offset())
    }

    fn resolve_fault(
        &mut self,
        ctx: &mut PagingContext<'_>,
        pid: Pid,
        vaddr: u32,
    ) -> Result<FaultResolution, FaultError> {
        let vpn = VirtualAddress::from_raw(vaddr).vpn();
        let page_count = ctx
            .spaces
            .space(pid)
            .ok_or(FaultError::UnknownProcess(pid))?
            .page_count();
        if vpn >= page_count {
            return Err(FaultError::OutOfRange { vpn, page_count });
        }

        let (frame, resolution) = match ctx.frames.alloc() {
            Ok(frame) => {
                info!("place vpn {vpn} of process {pid} in free frame {frame}");
                (frame, FaultResolution::FrameAvailable { frame })
            }
            Err(FrameExhausted) => {
                let frame = self.choose_victim().ok_or(FaultError::NoEvictableFrame)?;
                let victim = self.entries[frame];
                let written_back = self.evict(ctx, frame)?;
                info!(
                    "vpn {vpn} of process {pid} replaces vpn {} of process {} in frame {frame}",
                    victim.virtual_page, victim.owner
                );
                let resolution = FaultResolution::FrameReclaimed {
                    frame,
                    victim_owner: victim.owner,
                    victim_vpn: victim.virtual_page,
                    written_back,
                };
                (frame, resolution)
            }
        };

        let space = ctx.spaces.space(pid).ok_or(FaultError::UnknownProcess(pid))?;
        if let Err(err) = space.swap().read_page(vpn, ctx.memory.frame_mut(frame)) {
            ctx.frames.release(frame);
            return Err(err.into());
        }

        for entry in &mut *self.entries {
            if entry.flags.valid() {
                entry.recency = entry.recency.saturating_add(1);
            }
        }
        self.install(frame, pid, vpn, false);

        Ok(resolution)
    }

    fn save_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError> {
        let mut released = 0;
        for frame in 0..self.entries.len() {
            if !self.entries[frame].belongs_to(pid) {
                continue;
            }
            self.evict(ctx, frame)?;
            ctx.frames.release(frame);
            released += 1;
        }
        debug!("process {pid} gave up {released} frames");
        Ok(())
    }

    fn restore_state(&mut self, ctx: &mut PagingContext<'_>, pid: Pid) -> Result<(), FaultError> {
        let space = ctx.spaces.space(pid).ok_or(FaultError::UnknownProcess(pid))?;
        for vpn in 0..space.code_page_count() {
            if self.lookup(pid, vpn).is_some() {
                continue;
            }
            let Ok(frame) = ctx.frames.alloc() else {
                warn!("out of frames preloading code of process {pid} at vpn {vpn}");
                break;
            };
            if let Err(err) = space.swap().read_page(vpn, ctx.memory.frame_mut(frame)) {
                ctx.frames.release(frame);
                return Err(err.into());
            }
            self.install(frame, pid, vpn, true);
            debug!("pinned code page {vpn} of process {pid} in frame {frame}");
        }
        Ok(())
    }

    fn teardown(&mut self, frames: &mut FrameAllocator, pid: Pid) {
        for (frame, entry) in self.entries.iter_mut().enumerate() {
            if entry.belongs_to(pid) {
                entry.flags = EntryFlags::DEFAULT;
                frames.release(frame);
            }
        }
    }

    fn resident_mappings(&self) -> Vec<ResidentMapping> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.flags.valid())
            .map(|(frame, entry)| ResidentMapping {
                frame,
                owner: Some(entry.owner),
                vpn: entry.virtual_page,
            })
            .collect()
    }
}
