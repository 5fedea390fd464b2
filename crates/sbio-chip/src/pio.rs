//! PIO blocks: resource pools, FIFO registers and DREQ numbering.
//!
//! ```text
//! PIOn + 0x010 .. 0x01c   TXF0..TXF3   (write → state machine TX FIFO)
//! PIOn + 0x020 .. 0x02c   RXF0..RXF3   (read  ← state machine RX FIFO)
//!
//! DREQ  0.. 3  PIO0 TX0..TX3      DREQ  8..11  PIO1 TX0..TX3
//! DREQ  4.. 7  PIO0 RX0..RX3      DREQ 12..15  PIO1 RX0..RX3
//! ```

/// Number of PIO blocks.
pub const PIO_BLOCKS: usize = 2;

/// State machines per PIO block.
pub const STATE_MACHINES: usize = 4;

/// Shared instruction memory per PIO block (instructions).
pub const INSTRUCTION_SLOTS: usize = 32;

/// Depth of each (unjoined) TX or RX FIFO.
pub const FIFO_DEPTH: usize = 4;

/// PIO0 register block base.
pub const PIO0_BASE: u32 = 0x5020_0000;

/// PIO1 register block base.
pub const PIO1_BASE: u32 = 0x5030_0000;

/// Offset of TXF0 inside a PIO block.
pub const TXF0: u32 = 0x010;

/// Offset of RXF0 inside a PIO block.
pub const RXF0: u32 = 0x020;

/// One of the two PIO blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PioBlock {
    /// PIO0
    Pio0,
    /// PIO1
    Pio1,
}

impl PioBlock {
    /// Both blocks, in index order.
    pub const ALL: [Self; PIO_BLOCKS] = [Self::Pio0, Self::Pio1];

    /// Block index (0 or 1).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Pio0 => 0,
            Self::Pio1 => 1,
        }
    }

    /// Register block base address.
    #[must_use]
    pub const fn base(self) -> u32 {
        match self {
            Self::Pio0 => PIO0_BASE,
            Self::Pio1 => PIO1_BASE,
        }
    }

    /// Address of the TX FIFO write register of state machine `sm`.
    #[must_use]
    pub const fn txf(self, sm: u8) -> u32 {
        self.base() + TXF0 + 4 * sm as u32
    }

    /// Address of the RX FIFO read register of state machine `sm`.
    #[must_use]
    pub const fn rxf(self, sm: u8) -> u32 {
        self.base() + RXF0 + 4 * sm as u32
    }

    /// DREQ number for a state machine FIFO. `is_tx` selects the TX FIFO
    /// (request while not full) over the RX FIFO (request while not empty).
    #[must_use]
    pub const fn dreq(self, sm: u8, is_tx: bool) -> u8 {
        let block = match self {
            Self::Pio0 => 0,
            Self::Pio1 => 8,
        };
        block + (if is_tx { 0 } else { 4 }) + sm
    }

    /// Decode a FIFO register address back to `(block, sm, is_tx)`.
    #[must_use]
    pub fn decode_fifo(addr: u32) -> Option<(Self, u8, bool)> {
        let block = Self::ALL.into_iter().find(|b| addr & !0xFFF == b.base())?;
        let offset = addr - block.base();
        if offset % 4 != 0 {
            return None;
        }
        let (first, is_tx) = match offset {
            0x010..=0x01c => (TXF0, true),
            0x020..=0x02c => (RXF0, false),
            _ => return None,
        };
        let sm = u8::try_from((offset - first) / 4).ok()?;
        Some((block, sm, is_tx))
    }
}

impl std::fmt::Display for PioBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pio{}", self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_addresses_round_trip() {
        for block in PioBlock::ALL {
            for sm in 0..4u8 {
                assert_eq!(PioBlock::decode_fifo(block.txf(sm)), Some((block, sm, true)));
                assert_eq!(PioBlock::decode_fifo(block.rxf(sm)), Some((block, sm, false)));
            }
        }
        assert_eq!(PioBlock::decode_fifo(PIO0_BASE), None);
        assert_eq!(PioBlock::decode_fifo(PIO0_BASE + 0x011), None);
    }

    #[test]
    fn dreq_numbering() {
        assert_eq!(PioBlock::Pio0.dreq(0, true), 0);
        assert_eq!(PioBlock::Pio0.dreq(3, false), 7);
        assert_eq!(PioBlock::Pio1.dreq(1, true), 9);
        assert_eq!(PioBlock::Pio1.dreq(2, false), 14);
    }
}
