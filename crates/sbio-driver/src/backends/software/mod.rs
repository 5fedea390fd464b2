// SPDX-License-Identifier: AGPL-3.0-only

//! Software (simulated board) backend
//!
//! Implements [`BridgeBackend`] with a cycle-stepped model of both PIO
//! blocks, the DMA controller, the shared buffer and the FPGA on the other
//! end of the pins. Every [`advance`](BridgeBackend::advance) is one wire
//! cycle: the device acts, then DMA runs until it settles.
//!
//! The model is faithful at the level the bridge depends on (FIFO depth,
//! DREQ pacing, register-alias triggering, header routing, address seeding)
//! and makes no attempt at sub-word timing.
//!
//! ```text
//!            ┌─────────── SoftwareBackend ────────────┐
//!  device ──►│ SimPio ×2 ──► SimDma ──► SharedBuffer  │
//!  device ◄──│ SimPio ×2 ◄── SimDma ◄── SharedBuffer  │
//!            └────────────────────────────────────────┘
//! ```

pub mod device;
mod dma;
mod pio;

pub use device::{DeviceSlot, RingRecord, SimulatedDevice};

use crate::backend::{BridgeBackend, ChannelSetup, ChannelStatus};
use crate::buffer::SharedBuffer;
use crate::config::BridgeConfig;
use dma::{Bus, SimDma};
use pio::SimPio;
use sbio_chip::pio::{PioBlock, PIO_BLOCKS};
use sbio_chip::program::{LanePins, SerialProgram};
use sbio_chip::wire::PayloadTag;
use tracing::{debug, info};

/// Wire cycles per microsecond (half the 100.8 MHz system clock)
pub const CYCLES_PER_US: u64 = 50;

/// Simulated board
#[derive(Debug)]
pub struct SoftwareBackend {
    pios: [SimPio; PIO_BLOCKS],
    dma: SimDma,
    buffer: SharedBuffer,
    device: SimulatedDevice,
    dma_prioritized: bool,
    io_services: u64,
}

impl SoftwareBackend {
    /// Board wired as `config` describes
    pub fn new(config: &BridgeConfig) -> Self {
        info!(
            "Software backend: rx pins {}, tx pins {}, buffer {:#010x}",
            config.rx_pin_base, config.tx_pin_base, config.buffer_base
        );
        Self {
            pios: [SimPio::new(PioBlock::Pio0), SimPio::new(PioBlock::Pio1)],
            dma: SimDma::default(),
            buffer: SharedBuffer::new(config.buffer_base),
            device: SimulatedDevice::new(config.rx_pin_base, config.tx_pin_base),
            dma_prioritized: false,
            io_services: 0,
        }
    }

    /// Board with default wiring
    pub fn with_defaults() -> Self {
        Self::new(&BridgeConfig::default())
    }

    /// Simulate other firmware holding `slots` instruction slots on `pio`
    #[must_use]
    pub fn with_program_slots_taken(mut self, pio: PioBlock, slots: usize) -> Self {
        self.pios[pio.index()].occupy_slots(slots);
        self
    }

    /// Simulate other firmware holding `count` DMA channels
    #[must_use]
    pub fn with_dma_channels_taken(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.dma.claim();
        }
        self
    }

    /// The peer device
    pub const fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    /// The peer device, mutable
    pub fn device_mut(&mut self) -> &mut SimulatedDevice {
        &mut self.device
    }

    /// Drive one tagged word from the device right now and let DMA settle
    pub fn inject(&mut self, write: PayloadTag, read: PayloadTag, value: u32) {
        self.device.drive(&mut self.pios, write, read, value);
        self.pump_dma();
    }

    /// Run `cycles` wire cycles
    pub fn run_cycles(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.advance();
        }
    }

    /// True once [`BridgeBackend::prioritize_dma`] ran
    pub const fn dma_prioritized(&self) -> bool {
        self.dma_prioritized
    }

    /// Words lost to full RX FIFOs
    pub fn rx_overruns(&self) -> u64 {
        self.pios.iter().map(SimPio::overruns).sum()
    }

    /// Beats moved by DMA since power-up
    pub const fn dma_beats(&self) -> u64 {
        self.dma.beats()
    }

    /// Host I/O service calls so far
    pub const fn io_services(&self) -> u64 {
        self.io_services
    }

    fn pump_dma(&mut self) {
        let mut bus = Bus {
            pios: &mut self.pios,
            buffer: &mut self.buffer,
        };
        self.dma.pump(&mut bus);
    }
}

impl BridgeBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn can_add_program(&self, pio: PioBlock, program: &SerialProgram) -> bool {
        self.pios[pio.index()].can_add(program)
    }

    fn add_program(&mut self, pio: PioBlock, program: &SerialProgram) -> u8 {
        let offset = self.pios[pio.index()].add(program);
        debug!("{pio}: loaded {} at offset {offset}", program.name);
        offset
    }

    fn claim_unused_sm(&mut self, pio: PioBlock) -> Option<u8> {
        self.pios[pio.index()].claim()
    }

    fn init_state_machine(
        &mut self,
        pio: PioBlock,
        sm: u8,
        _offset: u8,
        program: &SerialProgram,
        pins: LanePins,
    ) {
        self.pios[pio.index()].init(sm, program, pins);
    }

    fn sm_try_put(&mut self, pio: PioBlock, sm: u8, word: u32) -> bool {
        self.pios[pio.index()].put(sm, word)
    }

    fn sm_try_get(&mut self, pio: PioBlock, sm: u8) -> Option<u32> {
        self.pios[pio.index()].get(sm)
    }

    fn sm_tx_is_empty(&self, pio: PioBlock, sm: u8) -> bool {
        self.pios[pio.index()].tx_is_empty(sm)
    }

    fn prioritize_dma(&mut self) {
        self.dma_prioritized = true;
    }

    fn claim_dma_channel(&mut self) -> Option<u8> {
        self.dma.claim()
    }

    fn configure_channel(&mut self, channel: u8, setup: &ChannelSetup) {
        self.dma.configure(channel, setup);
        if setup.start {
            self.pump_dma();
        }
    }

    fn abort_channel(&mut self, channel: u8) {
        self.dma.abort(channel);
    }

    fn channel_status(&self, channel: u8) -> ChannelStatus {
        self.dma.status(channel)
    }

    fn set_run_mode(&mut self, run: bool) {
        self.device.set_run(run);
    }

    fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut SharedBuffer {
        &mut self.buffer
    }

    fn service_io(&mut self) {
        self.io_services += 1;
    }

    fn advance(&mut self) {
        self.device.step(&mut self.pios);
        self.pump_dma();
    }

    fn now_us(&self) -> u64 {
        self.device.cycle() / CYCLES_PER_US
    }
}
