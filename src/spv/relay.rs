//! Difficulty relay interface.
//!
//! The relay tracks Bitcoin's running difficulty externally; the SPV
//! core only reads the current and previous epoch values from it.

/// External difficulty oracle consumed by [`super::SpvVerifier`].
pub trait DifficultyRelay {
    /// Difficulty of the current retarget epoch.
    fn current_epoch_difficulty(&self) -> u64;

    /// Difficulty of the previous retarget epoch.
    fn prev_epoch_difficulty(&self) -> u64;
}

/// Fixed-value relay for embedding in tests and single-epoch
/// deployments.
#[derive(Debug, Clone, Copy)]
pub struct StaticRelay {
    pub current: u64,
    pub prev: u64,
}

impl StaticRelay {
    pub fn new(current: u64, prev: u64) -> Self {
        Self { current, prev }
    }
}

impl DifficultyRelay for StaticRelay {
    fn current_epoch_difficulty(&self) -> u64 {
        self.current
    }

    fn prev_epoch_difficulty(&self) -> u64 {
        self.prev
    }
}
