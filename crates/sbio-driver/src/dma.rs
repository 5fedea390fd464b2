//! DMA chain engine
//!
//! Two chains of three channels each move data between the serial lanes and
//! the shared buffer without CPU involvement:
//!
//! ```text
//! write:  wcount RX ──► wdata.TRANS_COUNT
//!         waddr  RX ──► wdata.AL2_WRITE_ADDR_TRIG   (starts the burst)
//!         wdata  RX ──► buffer[addr..]              (paced by wdata RX)
//!
//! read:   rcount RX ──► rdata.TRANS_COUNT
//!         raddr  RX ──► rdata.AL3_READ_ADDR_TRIG    (starts the burst)
//!         buffer[addr..] ──► rdata TX               (paced by rdata TX)
//! ```
//!
//! The address and count channels run endlessly; the data channel sits idle
//! until an address word lands in its trigger alias. A data channel therefore
//! moves through three states, tracked by [`ChainTracker`].

use crate::backend::{BridgeBackend, ChannelConfig, ChannelSetup, ChannelStatus};
use crate::error::{BridgeError, Resource, Result};
use crate::lanes::{LaneRegistry, LaneRole};
use sbio_chip::bus;
use sbio_chip::dma::{self, ChannelRegister, TransferSize, ENDLESS, TREQ_PERMANENT};
use tracing::{debug, info};

/// Transfer state of a chained data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainState {
    /// Not running; waiting for an address
    #[default]
    Idle,
    /// Triggered by an address, no beat moved yet
    AddressArmed {
        /// Beats in this burst
        remaining: u32,
    },
    /// Burst in progress
    Transferring {
        /// Beats left
        remaining: u32,
    },
}

impl ChainState {
    /// Derive the state from a channel snapshot
    pub const fn from_status(status: &ChannelStatus) -> Self {
        if !status.busy {
            Self::Idle
        } else if status.remaining == status.reload {
            Self::AddressArmed {
                remaining: status.remaining,
            }
        } else {
            Self::Transferring {
                remaining: status.remaining,
            }
        }
    }

    /// True unless idle
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Beats left in the current burst
    pub const fn remaining(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::AddressArmed { remaining } | Self::Transferring { remaining } => remaining,
        }
    }
}

/// Something that happened to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEvent {
    /// Transfer count reload written (count lane word)
    CountLoaded(u32),
    /// Trigger register written (address lane word, or explicit start)
    Triggered,
    /// One beat moved
    Beat,
    /// Channel aborted
    Aborted,
}

/// Channel transfer state machine
///
/// A count write only changes the reload value; it takes effect on the next
/// trigger. A trigger with a zero reload completes immediately. A trigger on
/// a busy channel restarts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTracker {
    reload: u32,
    state: ChainState,
}

impl Default for ChainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainTracker {
    /// Idle channel with a reload of one beat
    pub const fn new() -> Self {
        Self {
            reload: 1,
            state: ChainState::Idle,
        }
    }

    /// Apply an event, returning the new state
    pub fn on(&mut self, event: ChainEvent) -> ChainState {
        self.state = match (event, self.state) {
            (ChainEvent::CountLoaded(count), state) => {
                self.reload = count;
                state
            }
            (ChainEvent::Triggered, _) if self.reload == 0 => ChainState::Idle,
            (ChainEvent::Triggered, _) => ChainState::AddressArmed {
                remaining: self.reload,
            },
            (
                ChainEvent::Beat,
                ChainState::AddressArmed { remaining } | ChainState::Transferring { remaining },
            ) => match remaining.saturating_sub(1) {
                0 => ChainState::Idle,
                left => ChainState::Transferring { remaining: left },
            },
            (ChainEvent::Beat, ChainState::Idle) | (ChainEvent::Aborted, _) => ChainState::Idle,
        };
        self.state
    }

    /// Current state
    pub const fn state(&self) -> ChainState {
        self.state
    }

    /// Count loaded on the next trigger
    pub const fn reload(&self) -> u32 {
        self.reload
    }
}

/// Chain direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device → buffer
    Write,
    /// Buffer → device
    Read,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write => f.pad("write"),
            Self::Read => f.pad("read"),
        }
    }
}

/// Channels of one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    /// Direction
    pub direction: Direction,
    /// Data channel
    pub data: u8,
    /// Address channel (triggers `data`)
    pub address: u8,
    /// Count channel (reloads `data`)
    pub count: u8,
}

impl ChainLink {
    const fn lanes(self) -> (LaneRole, LaneRole, LaneRole) {
        match self.direction {
            Direction::Write => (LaneRole::WriteData, LaneRole::WriteAddress, LaneRole::WriteCount),
            Direction::Read => (LaneRole::ReadData, LaneRole::ReadAddress, LaneRole::ReadCount),
        }
    }

    const fn trigger(self) -> ChannelRegister {
        match self.direction {
            Direction::Write => ChannelRegister::WriteAddressTrigger,
            Direction::Read => ChannelRegister::ReadAddressTrigger,
        }
    }

    /// Channels in claim order
    pub const fn channels(self) -> [u8; 3] {
        [self.data, self.address, self.count]
    }
}

/// The six chained channels
#[derive(Debug, Clone)]
pub struct DmaChain {
    write: ChainLink,
    read: ChainLink,
    enabled: bool,
}

impl DmaChain {
    /// Give DMA bus priority and claim six channels
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ResourceExhausted`] if fewer than six channels
    /// are free.
    pub fn claim<B: BridgeBackend>(backend: &mut B) -> Result<Self> {
        backend.prioritize_dma();
        let mut claim = |what: &str| {
            backend
                .claim_dma_channel()
                .ok_or_else(|| BridgeError::exhausted(Resource::DmaChannel, what))
        };
        let write = ChainLink {
            direction: Direction::Write,
            data: claim("write data")?,
            address: claim("write address")?,
            count: claim("write count")?,
        };
        let read = ChainLink {
            direction: Direction::Read,
            data: claim("read data")?,
            address: claim("read address")?,
            count: claim("read count")?,
        };
        debug!("DMA channels: write {:?}, read {:?}", write.channels(), read.channels());
        Ok(Self {
            write,
            read,
            enabled: false,
        })
    }

    /// Push the buffer's address seed into both address lanes
    ///
    /// Done once at bring-up; the address programs keep the seed for every
    /// later word.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LaneMissing`] if an address lane is absent and
    /// [`BridgeError::InvalidState`] if its TX FIFO is full.
    pub fn seed_address_lanes<B: BridgeBackend>(
        backend: &mut B,
        lanes: &LaneRegistry,
        buffer_base: u32,
    ) -> Result<()> {
        let seed = bus::address_seed(buffer_base);
        for role in [LaneRole::WriteAddress, LaneRole::ReadAddress] {
            let lane = lanes.lane(role)?;
            if !backend.sm_try_put(lane.pio, lane.sm, seed) {
                return Err(BridgeError::invalid_state(format!("{role} TX FIFO full")));
            }
        }
        debug!("Address lanes seeded with {seed:#x}");
        Ok(())
    }

    /// Program all six channels
    ///
    /// `enable == true` paces every channel on its lane and starts the address
    /// and count channels. `enable == false` aborts all six, then programs
    /// them unpaced and not started. Both directions are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LaneMissing`] if a lane is absent.
    pub fn configure<B: BridgeBackend>(
        &mut self,
        backend: &mut B,
        lanes: &LaneRegistry,
        enable: bool,
    ) -> Result<()> {
        if !enable {
            self.stop(backend);
        }
        let buffer_base = backend.buffer().base();
        for link in [self.write, self.read] {
            Self::configure_link(backend, lanes, link, buffer_base, enable)?;
        }
        self.enabled = enable;
        info!("DMA chain {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Abort all six channels
    pub fn stop<B: BridgeBackend>(&mut self, backend: &mut B) {
        for ch in self.channels() {
            backend.abort_channel(ch);
        }
        self.enabled = false;
    }

    /// True while the chain is enabled
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Channels of one direction
    pub const fn link(&self, direction: Direction) -> ChainLink {
        match direction {
            Direction::Write => self.write,
            Direction::Read => self.read,
        }
    }

    /// All six channels, write chain first
    pub const fn channels(&self) -> [u8; 6] {
        let w = self.write.channels();
        let r = self.read.channels();
        [w[0], w[1], w[2], r[0], r[1], r[2]]
    }

    /// Current state of a direction's data channel
    pub fn state<B: BridgeBackend>(&self, backend: &B, direction: Direction) -> ChainState {
        ChainState::from_status(&backend.channel_status(self.link(direction).data))
    }

    fn configure_link<B: BridgeBackend>(
        backend: &mut B,
        lanes: &LaneRegistry,
        link: ChainLink,
        buffer_base: u32,
        enable: bool,
    ) -> Result<()> {
        let (data_role, addr_role, count_role) = link.lanes();
        let data_lane = lanes.lane(data_role)?;
        let addr_lane = lanes.lane(addr_role)?;
        let count_lane = lanes.lane(count_role)?;
        let pace = |dreq: u8| if enable { dreq } else { TREQ_PERMANENT };

        // Data channel first: the address channel may trigger it as soon as
        // it starts.
        let data = match link.direction {
            Direction::Write => ChannelSetup {
                config: ChannelConfig {
                    read_increment: false,
                    write_increment: true,
                    size: TransferSize::Halfword,
                    dreq: pace(data_lane.rx_dreq()),
                },
                write_addr: buffer_base,
                read_addr: data_lane.rx_register(),
                count: 1,
                start: false,
            },
            Direction::Read => ChannelSetup {
                config: ChannelConfig {
                    read_increment: true,
                    write_increment: false,
                    size: TransferSize::Halfword,
                    dreq: pace(data_lane.tx_dreq()),
                },
                write_addr: data_lane.tx_register(),
                read_addr: buffer_base,
                count: 1,
                start: false,
            },
        };
        backend.configure_channel(link.data, &data);

        let feeder = |lane_rx: u32, dreq: u8, target: u32| ChannelSetup {
            config: ChannelConfig {
                read_increment: false,
                write_increment: false,
                size: TransferSize::Word,
                dreq: pace(dreq),
            },
            write_addr: target,
            read_addr: lane_rx,
            count: ENDLESS,
            start: enable,
        };
        backend.configure_channel(
            link.address,
            &feeder(
                addr_lane.rx_register(),
                addr_lane.rx_dreq(),
                dma::register_address(link.data, link.trigger()),
            ),
        );
        backend.configure_channel(
            link.count,
            &feeder(
                count_lane.rx_register(),
                count_lane.rx_dreq(),
                dma::register_address(link.data, ChannelRegister::TransferCount),
            ),
        );
        Ok(())
    }
}
