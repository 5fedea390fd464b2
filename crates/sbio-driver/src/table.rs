//! Transaction table
//!
//! The schedule the device replays in RUN mode: one tagged word per slot,
//! each followed by its cycle count and delay. A table is built host-side,
//! then written slot by slot through the [`ConfigController`] and armed with
//! an execution window of `[0, len)`.
//!
//! The read chain needs time to re-arm after its first trigger, so the first
//! read address of a table gets an extra delay; later ones get a (usually
//! zero) smaller margin. Both come from [`BridgeConfig`].

use crate::backend::BridgeBackend;
use crate::config::BridgeConfig;
use crate::controller::ConfigController;
use crate::error::{BridgeError, Result};
use sbio_chip::ring::{RingIndex, MAX_TABLE_SLOTS};
use sbio_chip::wire::{self, PayloadTag, CONTROL_DATA_BITS};
use tracing::debug;

/// What a slot tells the bridge to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Length of the next write burst
    WriteCount,
    /// Buffer offset of a write burst; starts it
    WriteAddress,
    /// One word of a write burst
    WriteData,
    /// Length of the next read burst
    ReadCount,
    /// Buffer offset of a read burst; starts it
    ReadAddress,
}

impl TransactionKind {
    /// `(write, read)` tag pair; the other side is idle
    pub const fn tags(self) -> (PayloadTag, PayloadTag) {
        match self {
            Self::WriteCount => (PayloadTag::TransferCount, PayloadTag::None),
            Self::WriteAddress => (PayloadTag::Address, PayloadTag::None),
            Self::WriteData => (PayloadTag::Data, PayloadTag::None),
            Self::ReadCount => (PayloadTag::None, PayloadTag::TransferCount),
            Self::ReadAddress => (PayloadTag::None, PayloadTag::Address),
        }
    }
}

/// One programmed slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// Tagged payload
    pub payload: u32,
    /// Cycle count
    pub count: u32,
    /// Delay cycles after the word
    pub delay: u32,
}

impl TableEntry {
    /// Slot for a typed transaction
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Wire`] if `value` exceeds the 20-bit payload.
    pub fn transaction(kind: TransactionKind, value: u32, count: u32, delay: u32) -> Result<Self> {
        let (write, read) = kind.tags();
        Ok(Self {
            payload: wire::pack_transaction(write, read, value)?,
            count,
            delay,
        })
    }

    /// Slot with an arbitrary 24-bit payload
    pub const fn raw(payload: u32, count: u32, delay: u32) -> Self {
        Self {
            payload,
            count,
            delay,
        }
    }
}

/// Slot timing used by the typed builders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTiming {
    /// Cycle count per slot
    pub count: u32,
    /// Delay per slot
    pub delay: u32,
    /// Extra delay on the first read address
    pub first_read_extra_delay: u32,
    /// Extra delay on later read addresses
    pub read_extra_delay: u32,
}

impl From<&BridgeConfig> for SlotTiming {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            count: cfg.slot_count,
            delay: cfg.slot_delay,
            first_read_extra_delay: cfg.first_read_extra_delay,
            read_extra_delay: cfg.read_extra_delay,
        }
    }
}

/// Host-side transaction schedule
#[derive(Debug, Clone)]
pub struct TransactionTable {
    entries: Vec<TableEntry>,
    timing: SlotTiming,
    countdown: u32,
    read_addresses: usize,
}

impl TransactionTable {
    /// Largest number of slots; the stop index must differ from slot 0
    pub const CAPACITY: usize = MAX_TABLE_SLOTS as usize - 1;

    /// Empty table with timing from `config`
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_timing(SlotTiming::from(config), config.tx_countdown)
    }

    /// Empty table with explicit timing
    pub const fn with_timing(timing: SlotTiming, countdown: u32) -> Self {
        Self {
            entries: Vec::new(),
            timing,
            countdown,
            read_addresses: 0,
        }
    }

    /// Append a slot
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] past [`Self::CAPACITY`].
    pub fn push(&mut self, entry: TableEntry) -> Result<RingIndex> {
        if self.entries.len() >= Self::CAPACITY {
            return Err(BridgeError::TableFull {
                capacity: Self::CAPACITY,
            });
        }
        let slot = u32::try_from(self.entries.len()).map(RingIndex::new).map_err(|_| {
            BridgeError::TableFull {
                capacity: Self::CAPACITY,
            }
        })?;
        self.entries.push(entry);
        Ok(slot)
    }

    /// Append a typed slot with the table's timing
    ///
    /// # Errors
    ///
    /// Returns error if the table is full, the value does not fit, or the
    /// slot's count or delay does not fit a control message.
    pub fn push_transaction(&mut self, kind: TransactionKind, value: u32) -> Result<RingIndex> {
        let extra = match kind {
            TransactionKind::ReadAddress if self.read_addresses == 0 => {
                self.timing.first_read_extra_delay
            }
            TransactionKind::ReadAddress => self.timing.read_extra_delay,
            _ => 0,
        };
        let delay = self
            .timing
            .delay
            .checked_add(extra)
            .filter(|d| d >> CONTROL_DATA_BITS == 0)
            .ok_or_else(|| {
                BridgeError::invalid_transaction(format!(
                    "delay {} + {extra} does not fit in {CONTROL_DATA_BITS} bits",
                    self.timing.delay
                ))
            })?;
        if self.timing.count >> CONTROL_DATA_BITS != 0 {
            return Err(BridgeError::invalid_transaction(format!(
                "count {} does not fit in {CONTROL_DATA_BITS} bits",
                self.timing.count
            )));
        }
        let slot = self.push(TableEntry::transaction(kind, value, self.timing.count, delay)?)?;
        if kind == TransactionKind::ReadAddress {
            self.read_addresses += 1;
        }
        Ok(slot)
    }

    /// Append a write burst length
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] if no slot is left.
    pub fn write_count(&mut self, count: u16) -> Result<RingIndex> {
        self.push_transaction(TransactionKind::WriteCount, count.into())
    }

    /// Append a write burst address
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] if no slot is left.
    pub fn write_address(&mut self, offset: u16) -> Result<RingIndex> {
        self.push_transaction(TransactionKind::WriteAddress, offset.into())
    }

    /// Append a write data word
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] if no slot is left.
    pub fn write_data(&mut self, word: u16) -> Result<RingIndex> {
        self.push_transaction(TransactionKind::WriteData, word.into())
    }

    /// Append a read burst length
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] if no slot is left.
    pub fn read_count(&mut self, count: u16) -> Result<RingIndex> {
        self.push_transaction(TransactionKind::ReadCount, count.into())
    }

    /// Append a read burst address
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TableFull`] if no slot is left.
    pub fn read_address(&mut self, offset: u16) -> Result<RingIndex> {
        self.push_transaction(TransactionKind::ReadAddress, offset.into())
    }

    /// Append a whole write burst: count, address, then the words
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTransaction`] for an empty or oversized
    /// burst and [`BridgeError::TableFull`] if it does not fit.
    pub fn write_burst(&mut self, offset: u16, words: &[u16]) -> Result<()> {
        let len = u16::try_from(words.len())
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                BridgeError::invalid_transaction(format!("write burst of {} words", words.len()))
            })?;
        if self.entries.len() + words.len() + 2 > Self::CAPACITY {
            return Err(BridgeError::TableFull {
                capacity: Self::CAPACITY,
            });
        }
        self.write_count(len)?;
        self.write_address(offset)?;
        for &word in words {
            self.write_data(word)?;
        }
        Ok(())
    }

    /// Append a read burst: count, then address
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTransaction`] for an empty burst and
    /// [`BridgeError::TableFull`] if it does not fit.
    pub fn read_burst(&mut self, offset: u16, len: u16) -> Result<()> {
        if len == 0 {
            return Err(BridgeError::invalid_transaction("read burst of 0 words"));
        }
        if self.entries.len() + 2 > Self::CAPACITY {
            return Err(BridgeError::TableFull {
                capacity: Self::CAPACITY,
            });
        }
        self.read_count(len)?;
        self.read_address(offset)?;
        Ok(())
    }

    /// Slots in order
    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no slot was added
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop index for the execution window
    pub fn stop_index(&self) -> RingIndex {
        RingIndex::new(u32::try_from(self.entries.len()).unwrap_or(0))
    }

    /// Countdown before the first slot fires
    pub const fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Words the device will receive back from the read chain
    pub fn expected_read_words(&self) -> usize {
        let mut pending = 1usize;
        let mut total = 0usize;
        for entry in &self.entries {
            let (_, read, value) = wire::unpack_transaction(entry.payload);
            match read {
                PayloadTag::TransferCount => pending = usize::try_from(value).unwrap_or(0),
                PayloadTag::Address => total += pending,
                _ => {}
            }
        }
        total
    }

    /// Write every slot, then arm `[0, len)` and reset the ring to
    /// `rx_cursor`
    ///
    /// # Errors
    ///
    /// Returns error if a control message cannot be sent.
    pub fn program<B: BridgeBackend>(
        &self,
        controller: &mut ConfigController<'_, B>,
        rx_cursor: RingIndex,
    ) -> Result<()> {
        let mut slot = RingIndex::ZERO;
        for entry in &self.entries {
            controller.program_transaction(slot, entry.payload, entry.count, entry.delay)?;
            slot = slot.next();
        }
        controller.arm(RingIndex::ZERO, self.stop_index(), self.countdown, rx_cursor)?;
        debug!("Programmed {} slots, countdown {}", self.len(), self.countdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TransactionTable {
        TransactionTable::new(&BridgeConfig::default())
    }

    #[test]
    fn typed_slots_carry_tags_and_timing() {
        let mut t = table();
        t.write_data(0x1234).unwrap();
        let e = t.entries()[0];
        assert_eq!(e.payload, 0x1_234E);
        assert_eq!((e.count, e.delay), (10, 1));
        let (w, r, v) = wire::unpack_transaction(e.payload);
        assert_eq!((w, r, v), (PayloadTag::Data, PayloadTag::None, 0x1234));
    }

    #[test]
    fn first_read_address_gets_extra_delay() {
        let mut t = table();
        t.read_burst(0, 2).unwrap();
        t.read_burst(3, 2).unwrap();
        let delays: Vec<u32> = t.entries().iter().map(|e| e.delay).collect();
        assert_eq!(delays, [1, 13, 1, 1]);
        assert_eq!(t.expected_read_words(), 4);
    }

    #[test]
    fn oversized_timing_is_refused() {
        let timing = SlotTiming {
            count: 10,
            delay: u32::MAX,
            first_read_extra_delay: 12,
            read_extra_delay: 0,
        };
        let mut t = TransactionTable::with_timing(timing, 0);
        assert!(matches!(t.read_address(0), Err(BridgeError::InvalidTransaction { .. })));

        let timing = SlotTiming {
            delay: 0xFF5,
            ..timing
        };
        let mut t = TransactionTable::with_timing(timing, 0);
        t.write_data(1).unwrap();
        assert!(t.read_address(0).is_err());
        assert_eq!(t.len(), 1);

        let timing = SlotTiming {
            count: 0x1000,
            delay: 1,
            ..timing
        };
        let mut t = TransactionTable::with_timing(timing, 0);
        assert!(t.write_count(1).is_err());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut t = table();
        for _ in 0..TransactionTable::CAPACITY {
            t.write_data(0).unwrap();
        }
        assert!(matches!(t.write_data(0), Err(BridgeError::TableFull { .. })));
        assert_eq!(t.stop_index(), RingIndex::new(1023));
    }

    #[test]
    fn bursts_reject_empty_and_oversized() {
        let mut t = table();
        assert!(t.write_burst(0, &[]).is_err());
        assert!(t.read_burst(0, 0).is_err());
        let big = vec![0u16; TransactionTable::CAPACITY];
        assert!(matches!(t.write_burst(0, &big), Err(BridgeError::TableFull { .. })));
        assert!(t.is_empty());
    }

    #[test]
    fn write_burst_layout() {
        let mut t = table();
        t.write_burst(5, &[7, 8]).unwrap();
        let kinds: Vec<_> = t
            .entries()
            .iter()
            .map(|e| {
                let (w, _, v) = wire::unpack_transaction(e.payload);
                (w, v)
            })
            .collect();
        assert_eq!(
            kinds,
            [
                (PayloadTag::TransferCount, 2),
                (PayloadTag::Address, 5),
                (PayloadTag::Data, 7),
                (PayloadTag::Data, 8),
            ]
        );
    }
}
