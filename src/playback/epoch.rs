/// Counter identifying the current playback attempt
///
/// Wraps to 0 after `u32::MAX`. Results carry the epoch they were started
/// under and are discarded unless it is still current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PlayEpoch(u32);

impl PlayEpoch {
    /// Epoch with the given value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw counter value
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Move to the next epoch and return it
    pub fn advance(&mut self) -> Self {
        self.0 = self.0.wrapping_add(1);
        *self
    }

    /// Whether a result started under `other` belongs to this epoch
    #[must_use]
    pub fn is_current(self, other: PlayEpoch) -> bool {
        self == other
    }
}

impl std::fmt::Display for PlayEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
