//! Simulated DMA controller
//!
//! Twelve channels sharing one bus. Each [`SimDma::pump`] pass gives every
//! busy channel whose request line is asserted one beat, in channel order,
//! and repeats until no channel can move. Writes landing on another
//! channel's count or trigger alias take effect immediately, which is what
//! lets the bridge chains run without CPU help.

use super::pio::SimPio;
use crate::backend::{ChannelConfig, ChannelSetup, ChannelStatus};
use crate::buffer::SharedBuffer;
use crate::dma::{ChainEvent, ChainTracker};
use sbio_chip::dma::{self, ChannelRegister, CHANNELS, TREQ_PERMANENT};
use sbio_chip::pio::{PioBlock, PIO_BLOCKS};
use tracing::{trace, warn};

/// Passes after which a pump gives up on a runaway unpaced channel
const MAX_PASSES: usize = 1 << 16;

#[derive(Debug, Default, Clone, Copy)]
struct SimChannel {
    claimed: bool,
    config: ChannelConfig,
    read_addr: u32,
    write_addr: u32,
    tracker: ChainTracker,
}

/// Everything a channel can reach on the bus besides the DMA block itself
pub(crate) struct Bus<'a> {
    pub(crate) pios: &'a mut [SimPio; PIO_BLOCKS],
    pub(crate) buffer: &'a mut SharedBuffer,
}

impl Bus<'_> {
    fn pio(&mut self, block: PioBlock) -> &mut SimPio {
        &mut self.pios[block.index()]
    }

    fn dreq_asserted(&self, dreq: u8) -> bool {
        if dreq == TREQ_PERMANENT {
            return true;
        }
        let (block, local) = match dreq {
            0..=7 => (PioBlock::Pio0, dreq),
            8..=15 => (PioBlock::Pio1, dreq - 8),
            _ => return false,
        };
        let pio = &self.pios[block.index()];
        if local < 4 {
            pio.tx_has_room(local)
        } else {
            pio.rx_has_data(local - 4)
        }
    }

    fn read(&mut self, addr: u32, size: dma::TransferSize) -> u32 {
        if let Some((block, sm, false)) = PioBlock::decode_fifo(addr) {
            return self.pio(block).get(sm).unwrap_or(0);
        }
        self.buffer.load(addr, size).unwrap_or_else(|| {
            warn!("DMA read from unmapped address {addr:#010x}");
            0
        })
    }

    /// Store one beat; returns a DMA register write for the caller to apply
    fn write(
        &mut self,
        addr: u32,
        size: dma::TransferSize,
        value: u32,
    ) -> Option<(u8, ChannelRegister, u32)> {
        if let Some(reg) = dma::decode_register(addr) {
            return Some((reg.0, reg.1, value));
        }
        if let Some((block, sm, true)) = PioBlock::decode_fifo(addr) {
            if !self.pio(block).put(sm, value) {
                warn!("DMA write to full {block} sm{sm} TX FIFO, word dropped");
            }
            return None;
        }
        if !self.buffer.store(addr, size, value) {
            warn!("DMA write to unmapped address {addr:#010x}");
        }
        None
    }
}

/// Simulated DMA block
#[derive(Debug, Default)]
pub struct SimDma {
    channels: [SimChannel; CHANNELS],
    beats: u64,
}

impl SimDma {
    pub(crate) fn claim(&mut self) -> Option<u8> {
        let (index, ch) = self
            .channels
            .iter_mut()
            .enumerate()
            .find(|(_, ch)| !ch.claimed)?;
        ch.claimed = true;
        u8::try_from(index).ok()
    }

    pub(crate) fn configure(&mut self, channel: u8, setup: &ChannelSetup) {
        let Some(ch) = self.channels.get_mut(usize::from(channel)) else {
            return;
        };
        ch.config = setup.config;
        ch.read_addr = setup.read_addr;
        ch.write_addr = setup.write_addr;
        ch.tracker = ChainTracker::new();
        ch.tracker.on(ChainEvent::CountLoaded(setup.count));
        if setup.start {
            ch.tracker.on(ChainEvent::Triggered);
        }
    }

    pub(crate) fn abort(&mut self, channel: u8) {
        if let Some(ch) = self.channels.get_mut(usize::from(channel)) {
            ch.tracker.on(ChainEvent::Aborted);
        }
    }

    pub(crate) fn status(&self, channel: u8) -> ChannelStatus {
        self.channels
            .get(usize::from(channel))
            .map(|ch| ChannelStatus {
                busy: ch.tracker.state().is_busy(),
                remaining: ch.tracker.state().remaining(),
                reload: ch.tracker.reload(),
                read_addr: ch.read_addr,
                write_addr: ch.write_addr,
            })
            .unwrap_or_default()
    }

    /// Total beats moved since reset
    pub(crate) const fn beats(&self) -> u64 {
        self.beats
    }

    /// Run every channel until none can make progress
    pub(crate) fn pump(&mut self, bus: &mut Bus<'_>) -> u64 {
        let start = self.beats;
        for _ in 0..MAX_PASSES {
            if !self.pass(bus) {
                return self.beats - start;
            }
        }
        warn!("DMA pump did not settle after {MAX_PASSES} passes");
        self.beats - start
    }

    fn pass(&mut self, bus: &mut Bus<'_>) -> bool {
        let mut moved = false;
        for index in 0..CHANNELS {
            let ch = &mut self.channels[index];
            if !ch.tracker.state().is_busy() || !bus.dreq_asserted(ch.config.dreq) {
                continue;
            }
            let size = ch.config.size;
            let value = bus.read(ch.read_addr, size);
            let side_effect = bus.write(ch.write_addr, size, value);
            if ch.config.read_increment {
                ch.read_addr = ch.read_addr.wrapping_add(size.bytes());
            }
            if ch.config.write_increment {
                ch.write_addr = ch.write_addr.wrapping_add(size.bytes());
            }
            ch.tracker.on(ChainEvent::Beat);
            self.beats += 1;
            moved = true;
            if let Some((target, reg, value)) = side_effect {
                self.register_write(target, reg, value);
            }
        }
        moved
    }

    fn register_write(&mut self, channel: u8, reg: ChannelRegister, value: u32) {
        let Some(ch) = self.channels.get_mut(usize::from(channel)) else {
            return;
        };
        trace!("DMA ch{channel} {reg:?} <- {value:#x}");
        match reg {
            ChannelRegister::TransferCount => {
                ch.tracker.on(ChainEvent::CountLoaded(value));
            }
            ChannelRegister::WriteAddressTrigger => {
                ch.write_addr = value;
                ch.tracker.on(ChainEvent::Triggered);
            }
            ChannelRegister::ReadAddressTrigger => {
                ch.read_addr = value;
                ch.tracker.on(ChainEvent::Triggered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbio_chip::bus::DEFAULT_BUFFER_BASE;
    use sbio_chip::dma::TransferSize;

    fn setup(
        config: ChannelConfig,
        read_addr: u32,
        write_addr: u32,
        count: u32,
        start: bool,
    ) -> ChannelSetup {
        ChannelSetup {
            config,
            write_addr,
            read_addr,
            count,
            start,
        }
    }

    #[test]
    fn unpaced_copy_then_idle() {
        let mut pios = [SimPio::new(PioBlock::Pio0), SimPio::new(PioBlock::Pio1)];
        let mut buffer = SharedBuffer::new(DEFAULT_BUFFER_BASE);
        for i in 0..4 {
            buffer.set(i, 100 + i);
        }
        let mut dma = SimDma::default();
        let ch = dma.claim().unwrap();
        let config = ChannelConfig {
            read_increment: true,
            write_increment: true,
            size: TransferSize::Halfword,
            dreq: TREQ_PERMANENT,
        };
        dma.configure(
            ch,
            &setup(config, buffer.address_of(0), buffer.address_of(16), 4, true),
        );
        let moved = dma.pump(&mut Bus {
            pios: &mut pios,
            buffer: &mut buffer,
        });
        assert_eq!(moved, 4);
        assert_eq!(&buffer.as_slice()[16..20], &[100, 101, 102, 103]);
        assert!(!dma.status(ch).busy);
    }

    #[test]
    fn register_write_triggers_other_channel() {
        let mut pios = [SimPio::new(PioBlock::Pio0), SimPio::new(PioBlock::Pio1)];
        let mut buffer = SharedBuffer::new(DEFAULT_BUFFER_BASE);
        buffer.set(0, 0xBEEF);
        let mut dma = SimDma::default();
        let target = dma.claim().unwrap();
        let feeder = dma.claim().unwrap();
        let copy = ChannelConfig {
            read_increment: true,
            write_increment: true,
            size: TransferSize::Halfword,
            dreq: TREQ_PERMANENT,
        };
        dma.configure(target, &setup(copy, 0, buffer.address_of(9), 1, false));
        // feeder writes cell 0's address into target's read trigger
        buffer.set(2, 0x0000);
        buffer.set(3, 0x2002);
        let feed = ChannelConfig {
            read_increment: false,
            write_increment: false,
            size: TransferSize::Word,
            dreq: TREQ_PERMANENT,
        };
        dma.configure(
            feeder,
            &setup(
                feed,
                buffer.address_of(2),
                dma::register_address(target, ChannelRegister::ReadAddressTrigger),
                1,
                true,
            ),
        );
        dma.pump(&mut Bus {
            pios: &mut pios,
            buffer: &mut buffer,
        });
        assert_eq!(buffer.get(9), 0xBEEF);
        assert_eq!(dma.beats(), 2);
    }

    #[test]
    fn aborted_channel_stops() {
        let mut dma = SimDma::default();
        let ch = dma.claim().unwrap();
        dma.configure(ch, &setup(ChannelConfig::default(), 0, 0, 8, true));
        assert!(dma.status(ch).busy);
        dma.abort(ch);
        assert!(!dma.status(ch).busy);
        assert_eq!(dma.status(ch).reload, 8);
    }
}
