pub const KB: usize = 1024;

// The simulated disk transfers whole sectors; pages are sized to match.
pub const SECTOR_SIZE: usize = 128;
