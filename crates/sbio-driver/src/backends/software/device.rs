// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated peer device
//!
//! The FPGA on the other end of the serial pins. In config mode it decodes
//! control messages arriving on the host's transmit lane and answers read
//! requests on the write-data lane. In run mode it replays its slot table,
//! one word per slot, and records every word the host transmits into its
//! receive ring together with a 16-bit cycle timestamp.
//!
//! Timing is counted in wire cycles: a slot occupies `delay + count + 1`
//! cycles, a word from the host occupies [`WORD_SPACING`] cycles.

use super::pio::SimPio;
use sbio_chip::pio::PIO_BLOCKS;
use sbio_chip::program::WORD_CYCLES;
use sbio_chip::ring::{RingIndex, RING_SLOTS};
use sbio_chip::wire::{self, ControlHeader, ControlMessage, PayloadTag};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Cycles one word occupies on a serial lane, start bit included
pub const WORD_SPACING: u64 = WORD_CYCLES as u64 + 1;

const TIMESTAMP_MASK: u64 = 0xFFFF;

/// One entry of the device's slot table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSlot {
    /// Idle cycles after the word
    pub delay: u32,
    /// Cycles the word occupies
    pub count: u32,
    /// Tagged transaction payload
    pub payload: u32,
}

/// One entry of the device's receive ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingRecord {
    /// Word received from the host
    pub payload: u32,
    /// Cycle timestamp at reception
    pub timestamp: u32,
}

/// Two-bit lane header a tag presents on one pin
const fn lane_header(tag: PayloadTag) -> u8 {
    let code = tag.code();
    (((code >> 1) & 0b10) | (code & 1)) as u8
}

/// The simulated peer device
#[derive(Debug)]
pub struct SimulatedDevice {
    rx_pin_base: u8,
    tx_pin_base: u8,
    slots: Box<[DeviceSlot]>,
    selected: RingIndex,
    tx_index: RingIndex,
    tx_stop: RingIndex,
    countdown: u32,
    ring: Box<[RingRecord]>,
    rx_head: RingIndex,
    run: bool,
    cycle: u64,
    next_emit: u64,
    host_word_at: u64,
    reply_at: u64,
    replies: VecDeque<u32>,
    control_log: Vec<ControlMessage>,
    emitted: u64,
}

impl SimulatedDevice {
    pub(crate) fn new(rx_pin_base: u8, tx_pin_base: u8) -> Self {
        Self {
            rx_pin_base,
            tx_pin_base,
            slots: vec![DeviceSlot::default(); usize::from(RING_SLOTS)].into_boxed_slice(),
            selected: RingIndex::ZERO,
            tx_index: RingIndex::ZERO,
            tx_stop: RingIndex::ZERO,
            countdown: 0,
            ring: vec![RingRecord::default(); usize::from(RING_SLOTS)].into_boxed_slice(),
            rx_head: RingIndex::ZERO,
            run: false,
            cycle: 0,
            next_emit: 0,
            host_word_at: 0,
            reply_at: 0,
            replies: VecDeque::new(),
            control_log: Vec::new(),
            emitted: 0,
        }
    }

    /// Cycles elapsed since power-up
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// True while the mode signal says RUN
    pub const fn is_running(&self) -> bool {
        self.run
    }

    /// Slot table entry
    pub fn slot(&self, index: RingIndex) -> DeviceSlot {
        self.slots[usize::from(index.value())]
    }

    /// Next slot to fire and the stop slot
    pub const fn tx_window(&self) -> (RingIndex, RingIndex) {
        (self.tx_index, self.tx_stop)
    }

    /// Receive ring head
    pub const fn ring_head(&self) -> RingIndex {
        self.rx_head
    }

    /// Receive ring entry
    pub fn ring_entry(&self, index: RingIndex) -> RingRecord {
        self.ring[usize::from(index.value())]
    }

    /// Payloads received since `from`, up to the head
    pub fn received_since(&self, from: RingIndex) -> Vec<u32> {
        let mut out = Vec::new();
        let mut i = from;
        while i != self.rx_head {
            out.push(self.ring_entry(i).payload);
            i = i.next();
        }
        out
    }

    /// Every control message decoded so far, in arrival order
    pub fn control_log(&self) -> &[ControlMessage] {
        &self.control_log
    }

    /// Forget the control log
    pub fn clear_control_log(&mut self) {
        self.control_log.clear();
    }

    /// Words emitted in run mode since power-up
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Store a ring entry and advance the head, as if received from the host
    pub fn push_ring(&mut self, record: RingRecord) {
        self.ring[usize::from(self.rx_head.value())] = record;
        self.rx_head = self.rx_head.next();
    }

    /// Move the ring head without storing anything
    pub fn set_ring_head(&mut self, head: RingIndex) {
        self.rx_head = head;
    }

    pub(crate) fn set_run(&mut self, run: bool) {
        if run != self.run {
            debug!("Device enters {} mode at cycle {}", if run { "RUN" } else { "CONFIG" }, self.cycle);
            self.next_emit = self.cycle;
        }
        self.run = run;
    }

    /// Drive a tagged word onto both receive pins
    pub(crate) fn drive(&self, pios: &mut [SimPio; PIO_BLOCKS], write: PayloadTag, read: PayloadTag, value: u32) {
        #[allow(clippy::cast_possible_truncation)]
        let word = value as u16;
        for pio in pios.iter_mut() {
            pio.deliver(self.rx_pin_base, lane_header(write), word);
            pio.deliver(self.rx_pin_base.wrapping_add(1), lane_header(read), word);
        }
    }

    /// Advance one wire cycle
    pub(crate) fn step(&mut self, pios: &mut [SimPio; PIO_BLOCKS]) {
        self.cycle += 1;
        if self.run {
            self.run_cycle(pios);
        } else {
            self.config_cycle(pios);
        }
    }

    fn take_host_word(&mut self, pios: &mut [SimPio; PIO_BLOCKS]) -> Option<u32> {
        if self.cycle < self.host_word_at {
            return None;
        }
        let word = pios
            .iter_mut()
            .find_map(|pio| pio.take_transmitted(self.tx_pin_base))?;
        self.host_word_at = self.cycle + WORD_SPACING;
        Some(word & 0xFFFF)
    }

    fn config_cycle(&mut self, pios: &mut [SimPio; PIO_BLOCKS]) {
        if let Some(word) = self.take_host_word(pios) {
            match ControlMessage::decode(word) {
                Ok(msg) => self.apply(msg),
                Err(e) => warn!("Device ignores control word {word:#06x}: {e}"),
            }
        }
        if self.cycle >= self.reply_at {
            if let Some(reply) = self.replies.pop_front() {
                self.drive(pios, PayloadTag::Data, PayloadTag::None, reply);
                self.reply_at = self.cycle + WORD_SPACING;
            }
        }
    }

    fn apply(&mut self, msg: ControlMessage) {
        trace!("Device control {:?} {:#x}", msg.header, msg.data);
        self.control_log.push(msg);
        let slot = &mut self.slots[usize::from(self.selected.value())];
        match msg.header {
            ControlHeader::SetTxIndex => self.tx_index = RingIndex::new(msg.data),
            ControlHeader::SetTxStopIndex => self.tx_stop = RingIndex::new(msg.data),
            ControlHeader::SetTxCountdown => self.countdown = msg.data,
            ControlHeader::SetSlotIndex => self.selected = RingIndex::new(msg.data),
            ControlHeader::SetSlotDelay => slot.delay = msg.data,
            ControlHeader::SetSlotCount => slot.count = msg.data,
            ControlHeader::SetSlotPayloadLow => {
                let (_, high) = wire::split_payload(slot.payload);
                slot.payload = wire::join_payload(msg.data, high);
            }
            ControlHeader::SetSlotPayloadHigh => {
                let (low, _) = wire::split_payload(slot.payload);
                slot.payload = wire::join_payload(low, msg.data);
            }
            ControlHeader::SetRxCursor => self.rx_head = RingIndex::new(msg.data),
            ControlHeader::ReadRxHead => self.replies.push_back(u32::from(self.rx_head.value())),
            ControlHeader::ReadRxPayload => {
                let entry = self.ring_entry(RingIndex::new(msg.data));
                self.replies.push_back(entry.payload);
            }
            ControlHeader::ReadRxTimestamp => {
                let entry = self.ring_entry(RingIndex::new(msg.data));
                self.replies.push_back(entry.timestamp);
            }
        }
    }

    fn run_cycle(&mut self, pios: &mut [SimPio; PIO_BLOCKS]) {
        if self.cycle >= self.next_emit && self.tx_index != self.tx_stop {
            if self.countdown > 0 {
                self.countdown -= 1;
                self.next_emit = self.cycle + 1;
            } else {
                let slot = self.slot(self.tx_index);
                let (write, read, value) = wire::unpack_transaction(slot.payload);
                trace!("Device slot {} emits {write:?}/{read:?} {value:#x}", self.tx_index);
                self.drive(pios, write, read, value);
                self.emitted += 1;
                self.next_emit = self.cycle + u64::from(slot.delay) + u64::from(slot.count) + 1;
                self.tx_index = self.tx_index.next();
            }
        }
        if let Some(word) = self.take_host_word(pios) {
            #[allow(clippy::cast_possible_truncation)]
            let timestamp = (self.cycle & TIMESTAMP_MASK) as u32;
            self.push_ring(RingRecord {
                payload: word,
                timestamp,
            });
        }
    }
}
