//! Backend abstraction for the bridge hardware
//!
//! Everything above this trait (lane registry, DMA chain, controller) is
//! written against the handful of PIO, DMA and bus primitives the bridge
//! needs. The simulated board in [`crate::backends::software`] implements the
//! same surface so every operation can run and be tested off-target.

use crate::buffer::SharedBuffer;
use sbio_chip::dma::{TransferSize, TREQ_PERMANENT};
use sbio_chip::pio::PioBlock;
use sbio_chip::program::{LanePins, SerialProgram};
use std::fmt::Debug;

/// Bridge backend trait: PIO, DMA and bus primitives
///
/// Allocation calls return `None` / `false` when the pool is exhausted; the
/// caller decides whether that is fatal.
pub trait BridgeBackend: Debug + Send {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// True if `program` fits in the free instruction memory of `pio`
    fn can_add_program(&self, pio: PioBlock, program: &SerialProgram) -> bool;

    /// Load `program` into `pio`, returning its instruction offset
    ///
    /// Only called after [`can_add_program`](Self::can_add_program) agreed.
    fn add_program(&mut self, pio: PioBlock, program: &SerialProgram) -> u8;

    /// Claim a free state machine on `pio`
    fn claim_unused_sm(&mut self, pio: PioBlock) -> Option<u8>;

    /// Configure and start state machine `sm` running the program at `offset`
    fn init_state_machine(
        &mut self,
        pio: PioBlock,
        sm: u8,
        offset: u8,
        program: &SerialProgram,
        pins: LanePins,
    );

    /// Push a word into a state machine's TX FIFO; false if full
    fn sm_try_put(&mut self, pio: PioBlock, sm: u8, word: u32) -> bool;

    /// Pop a word from a state machine's RX FIFO
    fn sm_try_get(&mut self, pio: PioBlock, sm: u8) -> Option<u32>;

    /// True once a state machine's TX FIFO has drained
    fn sm_tx_is_empty(&self, pio: PioBlock, sm: u8) -> bool;

    /// Give DMA bus priority over both processors
    fn prioritize_dma(&mut self);

    /// Claim a free DMA channel
    fn claim_dma_channel(&mut self) -> Option<u8>;

    /// Program a channel, triggering it if `setup.start`
    fn configure_channel(&mut self, channel: u8, setup: &ChannelSetup);

    /// Abort a channel, discarding any transfer in progress
    fn abort_channel(&mut self, channel: u8);

    /// Snapshot of a channel's transfer state
    fn channel_status(&self, channel: u8) -> ChannelStatus;

    /// Drive the CONFIG/RUN mode signal (`true` = RUN)
    fn set_run_mode(&mut self, run: bool);

    /// The shared buffer
    fn buffer(&self) -> &SharedBuffer;

    /// The shared buffer, mutable
    fn buffer_mut(&mut self) -> &mut SharedBuffer;

    /// Service host USB I/O
    fn service_io(&mut self) {}

    /// Let autonomous parts (DMA, peer device) make progress
    ///
    /// A no-op on real hardware, where they progress on their own.
    fn advance(&mut self) {}

    /// Monotonic microsecond clock
    fn now_us(&self) -> u64;
}

/// Channel control settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Increment the read address after each beat
    pub read_increment: bool,
    /// Increment the write address after each beat
    pub write_increment: bool,
    /// Beat size
    pub size: TransferSize,
    /// Transfer request signal; [`TREQ_PERMANENT`] runs unpaced
    pub dreq: u8,
}

impl Default for ChannelConfig {
    /// Reset state of a channel: read increment, 32-bit beats, unpaced
    fn default() -> Self {
        Self {
            read_increment: true,
            write_increment: false,
            size: TransferSize::Word,
            dreq: TREQ_PERMANENT,
        }
    }
}

impl ChannelConfig {
    /// True if the channel waits on a peripheral request
    pub const fn is_paced(&self) -> bool {
        self.dreq != TREQ_PERMANENT
    }
}

/// Everything [`BridgeBackend::configure_channel`] writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSetup {
    /// Control settings
    pub config: ChannelConfig,
    /// Initial write address
    pub write_addr: u32,
    /// Initial read address
    pub read_addr: u32,
    /// Transfer count (reload value)
    pub count: u32,
    /// Trigger now
    pub start: bool,
}

/// Transfer state of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Channel is running
    pub busy: bool,
    /// Beats left in the current transfer
    pub remaining: u32,
    /// Count loaded on the next trigger
    pub reload: u32,
    /// Current read address
    pub read_addr: u32,
    /// Current write address
    pub write_addr: u32,
}
