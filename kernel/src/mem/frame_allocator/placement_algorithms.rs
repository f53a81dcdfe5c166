//! Implementation of some common frame placement policies.

use super::{CoreMapEntry, FrameExhausted};
use alloc::boxed::Box;

/// Which placement algorithm a frame allocator uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Placement {
    /// Always the lowest-numbered free frame.
    #[default]
    FirstFit,
    /// The first free frame after the one handed out last, wrapping around.
    NextFit,
}

impl Placement {
    pub(super) fn algorithm(self) -> Box<dyn PlacementAlgorithm> {
        match self {
            Placement::FirstFit => Box::new(FirstFit),
            Placement::NextFit => Box::<NextFit>::default(),
        }
    }
}

/// A placement algorithm for allocating frames.
pub trait PlacementAlgorithm {
    /// Returns [`Ok`] containing the frame number to be allocated.
    ///
    /// # Errors
    ///
    /// If no frame is free, the function returns an error.
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Result<usize, FrameExhausted>;
}

#[derive(Default)]
pub struct NextFit {
    /// The next frame number to start searching for free frames.
    position: usize,
}

// There is no internal data for this algorithm. Declare it as a zero-sized type.
#[derive(Default)]
pub struct FirstFit;

impl PlacementAlgorithm for NextFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Result<usize, FrameExhausted> {
        let total_frames = core_map.len();

        for step in 0..total_frames {
            let frame = (self.position + step) % total_frames;
            if !core_map[frame].allocated() {
                self.position = (frame + 1) % total_frames;
                return Ok(frame);
            }
        }

        Err(FrameExhausted)
    }
}

impl PlacementAlgorithm for FirstFit {
    fn place(&mut self, core_map: &[CoreMapEntry]) -> Result<usize, FrameExhausted> {
        core_map
            .iter()
            .position(|entry| !entry.allocated())
            .ok_or(FrameExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ops::Range;

    /// Fills the coremap entries in `range` to indicate they are allocated.
    fn fill_coremap_range(core_map: &mut [CoreMapEntry], range: &Range<usize>) {
        for i in range.clone() {
            assert!(!core_map[i].allocated());
            core_map[i] = core_map[i].with_allocated(true);
        }
    }

    #[test]
    fn test_next_fit() {
        let mut core_map = [CoreMapEntry::default(); 16];
        fill_coremap_range(&mut core_map, &(1..4));
        fill_coremap_range(&mut core_map, &(8..12));

        // Frames left are 0, 4-7, 12-15 (inclusive)

        let mut algorithm = NextFit { position: 2 };
        assert_eq!(algorithm.place(&core_map), Ok(4));
        fill_coremap_range(&mut core_map, &(4..5));

        // Next search starts from position 5
        assert_eq!(algorithm.place(&core_map), Ok(5));
        fill_coremap_range(&mut core_map, &(5..8));

        algorithm.position = 8;
        assert_eq!(algorithm.place(&core_map), Ok(12));
    }

    #[test]
    fn test_next_fit_wrap_around() {
        let mut core_map = [CoreMapEntry::default(); 16];
        let mut algorithm = NextFit { position: 8 };
        fill_coremap_range(&mut core_map, &(1..16));
        assert_eq!(algorithm.place(&core_map), Ok(0));
        fill_coremap_range(&mut core_map, &(0..1));
        assert_eq!(algorithm.place(&core_map), Err(FrameExhausted));
    }

    #[test]
    fn test_first_fit() {
        let mut core_map = [CoreMapEntry::default(); 16];
        fill_coremap_range(&mut core_map, &(0..4));
        fill_coremap_range(&mut core_map, &(5..13));

        // Frames left are 4, 13-15 (inclusive)

        let mut algorithm = FirstFit;
        assert_eq!(algorithm.place(&core_map), Ok(4));
        fill_coremap_range(&mut core_map, &(4..5));
        assert_eq!(algorithm.place(&core_map), Ok(13));

        fill_coremap_range(&mut core_map, &(13..16));
        assert_eq!(algorithm.place(&core_map), Err(FrameExhausted));
    }
}
