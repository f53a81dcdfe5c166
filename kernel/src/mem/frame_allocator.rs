mod placement_algorithms;

pub use placement_algorithms::Placement;

use alloc::{boxed::Box, vec};
use bitbybit::bitfield;
use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use log::warn;
use placement_algorithms::PlacementAlgorithm;

#[bitfield(u8, default = 0)]
pub struct CoreMapEntry {
    #[bit(0, rw)]
    allocated: bool,
}

/// Every physical frame is in use.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FrameExhausted;

impl Debug for FrameExhausted {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "FrameExhausted")
    }
}

impl Display for FrameExhausted {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "no free physical frames")
    }
}

impl Error for FrameExhausted {}

/// Tracks which physical frames are assigned, one core map entry per frame.
pub struct FrameAllocator {
    core_map: Box<[CoreMapEntry]>,
    placement_algorithm: Box<dyn PlacementAlgorithm>,
    frames_allocated: usize,
}

impl FrameAllocator {
    pub fn new(num_frames: usize, placement: Placement) -> Self {
        FrameAllocator {
            core_map: vec![CoreMapEntry::DEFAULT; num_frames].into_boxed_slice(),
            placement_algorithm: placement.algorithm(),
            frames_allocated: 0,
        }
    }

    /// Hands out one free frame. A frame is never handed out twice before it
    /// is released.
    pub fn alloc(&mut self) -> Result<usize, FrameExhausted> {
        if self.frames_allocated == self.core_map.len() {
            return Err(FrameExhausted);
        }

        let frame = self.placement_algorithm.place(&self.core_map)?;

        assert!(!self.core_map[frame].allocated());
        self.core_map[frame] = self.core_map[frame].with_allocated(true);
        self.frames_allocated += 1;

        Ok(frame)
    }

    /// Returns `frame` to the free pool. Releasing a frame that is already
    /// free (or doesn't exist) changes nothing and returns `false`.
    pub fn release(&mut self, frame: usize) -> bool {
        match self.core_map.get(frame).copied() {
            Some(entry) if entry.allocated() => {
                self.core_map[frame] = entry.with_allocated(false);
                self.frames_allocated -= 1;
                true
            }
            _ => {
                warn!("release of free frame {frame} ignored");
                false
            }
        }
    }

    pub fn release_all(&mut self) {
        self.core_map.fill(CoreMapEntry::DEFAULT);
        self.frames_allocated = 0;
    }

    pub fn is_allocated(&self, frame: usize) -> bool {
        self.core_map
            .get(frame)
            .is_some_and(|entry| entry.allocated())
    }

    pub fn free_count(&self) -> usize {
        self.core_map.len() - self.frames_allocated
    }

    pub fn num_frames(&self) -> usize {
        self.core_map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_until_exhausted() {
        let mut frames = FrameAllocator::new(3, Placement::FirstFit);
        assert_eq!(frames.alloc(), Ok(0));
        assert_eq!(frames.alloc(), Ok(1));
        assert_eq!(frames.alloc(), Ok(2));
        assert_eq!(frames.alloc(), Err(FrameExhausted));
        assert_eq!(frames.free_count(), 0);

        assert!(frames.release(1));
        assert_eq!(frames.free_count(), 1);
        assert_eq!(frames.alloc(), Ok(1));
    }

    #[test]
    fn double_release_is_a_no_op() {
        let mut frames = FrameAllocator::new(2, Placement::FirstFit);
        let frame = frames.alloc().unwrap();
        assert!(frames.release(frame));
        assert!(!frames.release(frame));
        assert!(!frames.release(17));
        assert_eq!(frames.free_count(), 2);
    }

    #[test]
    fn release_all_frees_everything() {
        let mut frames = FrameAllocator::new(4, Placement::NextFit);
        for _ in 0..4 {
            frames.alloc().unwrap();
        }
        frames.release_all();
        assert_eq!(frames.free_count(), 4);
        assert!((0..4).all(|frame| !frames.is_allocated(frame)));
    }

    #[test]
    fn no_frames_at_all() {
        let mut frames = FrameAllocator::new(0, Placement::FirstFit);
        assert_eq!(frames.alloc(), Err(FrameExhausted));
    }
}
