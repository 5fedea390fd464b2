//! Simulated PIO block
//!
//! Programs are not executed instruction by instruction. A state machine is
//! modelled by its two FIFOs and the wire behaviour of its program: receive
//! programs accept words whose header matches on their header pin, address
//! programs combine each word with the seed they pulled at start, transmit
//! programs hand TX FIFO words to whoever listens on their pins.

use sbio_chip::bus::BUFFER_ALIGN_SHIFT;
use sbio_chip::pio::{PioBlock, FIFO_DEPTH, INSTRUCTION_SLOTS, STATE_MACHINES};
use sbio_chip::program::{LanePins, ProgramKind, SerialProgram};
use std::collections::VecDeque;
use tracing::{trace, warn};

#[derive(Debug, Default)]
struct SimStateMachine {
    claimed: bool,
    running: Option<(SerialProgram, LanePins)>,
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    seed: Option<u32>,
    overruns: u64,
}

impl SimStateMachine {
    fn listens(&self, pin: u8, header: u8) -> bool {
        matches!(
            self.running,
            Some((program, pins)) if program.kind != ProgramKind::Transmit
                && pins.header_pin == pin
                && program.header == Some(header)
        )
    }

    fn transmits_on(&self, pin: u8) -> bool {
        matches!(
            self.running,
            Some((program, pins)) if program.kind == ProgramKind::Transmit && pins.data_base == pin
        )
    }
}

/// One simulated PIO block
#[derive(Debug)]
pub struct SimPio {
    block: PioBlock,
    used_slots: usize,
    sms: [SimStateMachine; STATE_MACHINES],
}

impl SimPio {
    pub(crate) fn new(block: PioBlock) -> Self {
        Self {
            block,
            used_slots: 0,
            sms: Default::default(),
        }
    }

    pub(crate) fn can_add(&self, program: &SerialProgram) -> bool {
        self.used_slots + usize::from(program.length) <= INSTRUCTION_SLOTS
    }

    pub(crate) fn add(&mut self, program: &SerialProgram) -> u8 {
        let offset = u8::try_from(self.used_slots).unwrap_or(u8::MAX);
        self.used_slots += usize::from(program.length);
        offset
    }

    /// Mark instruction slots as taken by other firmware
    pub(crate) fn occupy_slots(&mut self, slots: usize) {
        self.used_slots = (self.used_slots + slots).min(INSTRUCTION_SLOTS);
    }

    pub(crate) fn claim(&mut self) -> Option<u8> {
        let (index, sm) = self.sms.iter_mut().enumerate().find(|(_, sm)| !sm.claimed)?;
        sm.claimed = true;
        u8::try_from(index).ok()
    }

    pub(crate) fn init(&mut self, sm: u8, program: &SerialProgram, pins: LanePins) {
        if let Some(state) = self.sms.get_mut(usize::from(sm)) {
            state.running = Some((*program, pins));
        }
    }

    /// Host write to the TX FIFO
    pub(crate) fn put(&mut self, sm: u8, word: u32) -> bool {
        let Some(state) = self.sms.get_mut(usize::from(sm)) else {
            return false;
        };
        let pulls_seed = matches!(state.running, Some((p, _)) if p.kind == ProgramKind::ReceiveAddress);
        if pulls_seed && state.seed.is_none() {
            state.seed = Some(word);
            return true;
        }
        if state.tx.len() >= FIFO_DEPTH {
            return false;
        }
        state.tx.push_back(word);
        true
    }

    /// Host read from the RX FIFO
    pub(crate) fn get(&mut self, sm: u8) -> Option<u32> {
        self.sms.get_mut(usize::from(sm))?.rx.pop_front()
    }

    pub(crate) fn rx_has_data(&self, sm: u8) -> bool {
        self.sms.get(usize::from(sm)).is_some_and(|s| !s.rx.is_empty())
    }

    pub(crate) fn tx_has_room(&self, sm: u8) -> bool {
        self.sms
            .get(usize::from(sm))
            .is_some_and(|s| s.tx.len() < FIFO_DEPTH)
    }

    pub(crate) fn tx_is_empty(&self, sm: u8) -> bool {
        self.sms.get(usize::from(sm)).map_or(true, |s| s.tx.is_empty())
    }

    /// Device drives a word with two-bit `header` on `pin`
    pub(crate) fn deliver(&mut self, pin: u8, header: u8, value: u16) {
        let block = self.block;
        for (index, sm) in self.sms.iter_mut().enumerate() {
            if !sm.listens(pin, header) {
                continue;
            }
            let word = match sm.running {
                Some((p, _)) if p.kind == ProgramKind::ReceiveAddress => {
                    let Some(seed) = sm.seed else {
                        warn!("{block} sm{index}: address word before seed, dropped");
                        continue;
                    };
                    (seed << BUFFER_ALIGN_SHIFT) | (u32::from(value) << 1)
                }
                _ => u32::from(value),
            };
            if sm.rx.len() >= FIFO_DEPTH {
                sm.overruns += 1;
                warn!("{block} sm{index}: RX FIFO overrun, word {word:#x} lost");
                continue;
            }
            trace!("{block} sm{index} <- {word:#x}");
            sm.rx.push_back(word);
        }
    }

    /// Device pulls the next host word transmitted on `pin`
    pub(crate) fn take_transmitted(&mut self, pin: u8) -> Option<u32> {
        self.sms
            .iter_mut()
            .find(|sm| sm.transmits_on(pin))?
            .tx
            .pop_front()
    }

    pub(crate) fn overruns(&self) -> u64 {
        self.sms.iter().map(|s| s.overruns).sum()
    }
}
