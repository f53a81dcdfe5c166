use crate::mem::frame_allocator::Placement;
use crate::mem::page_replacement::ReplacementPolicy;
use pagingos_shared::mem::{NUM_PHYS_PAGES, TLB_SIZE};

/// How virtual pages are translated, fixed for the lifetime of a kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslationMode {
    /// A small associative cache refilled on every miss. Physical memory is
    /// laid out identically to the running address space.
    SoftwareTlb(ReplacementPolicy),
    /// One table with an entry per physical frame, shared by every process.
    InvertedPageTable,
}

#[derive(Clone, Debug)]
pub struct KernelConfig {
    pub num_phys_pages: usize,
    pub tlb_size: usize,
    pub translation: TranslationMode,
    pub placement: Placement,
    /// Print miss statistics when a process exits.
    pub report_paging_stats: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let policy = if cfg!(feature = "fifo") {
            ReplacementPolicy::Fifo
        } else {
            ReplacementPolicy::Lru
        };
        let translation = if cfg!(feature = "use_tlb") {
            TranslationMode::SoftwareTlb(policy)
        } else {
            TranslationMode::InvertedPageTable
        };

        Self {
            num_phys_pages: NUM_PHYS_PAGES,
            tlb_size: TLB_SIZE,
            translation,
            placement: Placement::FirstFit,
            report_paging_stats: true,
        }
    }
}

impl KernelConfig {
    pub fn with_translation(mut self, translation: TranslationMode) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_phys_pages(mut self, num_phys_pages: usize) -> Self {
        self.num_phys_pages = num_phys_pages;
        self
    }

    pub fn with_tlb_size(mut self, tlb_size: usize) -> Self {
        self.tlb_size = tlb_size;
        self
    }

    pub fn uses_tlb(&self) -> bool {
        matches!(self.translation, TranslationMode::SoftwareTlb(_))
    }
}
