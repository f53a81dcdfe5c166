/// Which entry a full software TLB gives up on a miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// The entry unreferenced for the most faults.
    Lru,
    /// Entries in the order they were installed.
    Fifo,
}

impl ReplacementPolicy {
    pub fn label(&self) -> &'static str {
        match self {
            ReplacementPolicy::Lru => "LRU",
            ReplacementPolicy::Fifo => "FIFO",
        }
    }
}

/// Picks the candidate with the largest recency counter. On a tie the first
/// candidate seen wins, so callers scanning in slot order get the lowest slot.
pub fn least_recently_used<I>(candidates: I) -> Option<usize>
where
    I: IntoIterator<Item = (usize, u32)>,
{
    let mut victim: Option<(usize, u32)> = None;
    for (index, recency) in candidates {
        if victim.map_or(true, |(_, oldest)| recency > oldest) {
            victim = Some((index, recency));
        }
    }
    victim.map(|(index, _)| index)
}
