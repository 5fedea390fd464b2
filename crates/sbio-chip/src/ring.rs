//! Receive ring index arithmetic.
//!
//! The device stores every word it receives in run mode into a 1024-entry
//! ring, together with a timestamp. Indices are 10 bits wide and wrap
//! silently; the head only ever moves forward.

/// Width of a ring index.
pub const RING_INDEX_BITS: u32 = 10;

/// Number of ring slots.
pub const RING_SLOTS: u16 = 1 << RING_INDEX_BITS;

/// Maximum number of transaction table slots (same width as the ring).
pub const MAX_TABLE_SLOTS: u16 = RING_SLOTS;

const MASK: u16 = RING_SLOTS - 1;

/// A 10-bit wrapping ring index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RingIndex(u16);

impl RingIndex {
    /// Index zero.
    pub const ZERO: Self = Self(0);

    /// Build an index, wrapping `value` into range.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let low = value as u16;
        Self(low & MASK)
    }

    /// Raw value in `0..RING_SLOTS`.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// The following index, wrapping 1023 → 0.
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) & MASK)
    }

    /// Number of entries from `self` up to (not including) `head`.
    ///
    /// `head == self` means no entries; a full ring is indistinguishable from
    /// an empty one.
    #[must_use]
    pub const fn distance_to(self, head: Self) -> u16 {
        head.0.wrapping_sub(self.0) & MASK
    }
}

impl From<RingIndex> for u32 {
    fn from(index: RingIndex) -> Self {
        u32::from(index.0)
    }
}

impl std::fmt::Display for RingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_after_last_slot() {
        let last = RingIndex::new(1023);
        assert_eq!(last.next(), RingIndex::ZERO);
        assert_eq!(RingIndex::new(1024), RingIndex::ZERO);
        assert_eq!(RingIndex::new(1030).value(), 6);
    }

    #[test]
    fn distance_across_wrap() {
        assert_eq!(RingIndex::new(3).distance_to(RingIndex::new(7)), 4);
        assert_eq!(RingIndex::new(1020).distance_to(RingIndex::new(2)), 6);
        assert_eq!(RingIndex::new(500).distance_to(RingIndex::new(500)), 0);
    }
}
