//! DMA controller register map.
//!
//! Each channel owns a 0x40-byte block containing four aliases of the same
//! four registers. The last register of every alias is a *trigger*: writing
//! it stores the value and starts the channel. The bridge relies on exactly
//! two of them:
//!
//! ```text
//! +0x08  TRANS_COUNT           reload value, no trigger   (count channels)
//! +0x2c  AL2_WRITE_ADDR_TRIG   write address + start      (write address channel)
//! +0x3c  AL3_READ_ADDR_TRIG    read address + start       (read address channel)
//! ```

/// Number of DMA channels.
pub const CHANNELS: usize = 12;

/// DMA register block base.
pub const DMA_BASE: u32 = 0x5000_0000;

/// Stride between channel register blocks.
pub const CHANNEL_STRIDE: u32 = 0x40;

/// `dreq` value meaning "unpaced, transfer as fast as possible".
pub const TREQ_PERMANENT: u8 = 0x3f;

/// Transfer count meaning "run forever" (all ones).
pub const ENDLESS: u32 = u32::MAX;

/// Channel register offsets.
pub mod regs {
    /// Read address.
    pub const READ_ADDR: u32 = 0x00;
    /// Write address.
    pub const WRITE_ADDR: u32 = 0x04;
    /// Transfer count (reload value).
    pub const TRANS_COUNT: u32 = 0x08;
    /// Control, trigger.
    pub const CTRL_TRIG: u32 = 0x0c;
    /// Alias 1 transfer count, trigger.
    pub const AL1_TRANS_COUNT_TRIG: u32 = 0x1c;
    /// Alias 2 transfer count.
    pub const AL2_TRANS_COUNT: u32 = 0x24;
    /// Alias 2 write address, trigger.
    pub const AL2_WRITE_ADDR_TRIG: u32 = 0x2c;
    /// Alias 3 transfer count.
    pub const AL3_TRANS_COUNT: u32 = 0x38;
    /// Alias 3 read address, trigger.
    pub const AL3_READ_ADDR_TRIG: u32 = 0x3c;
}

/// Registers of a channel that the bridge writes from another channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRegister {
    /// Transfer count reload, no trigger.
    TransferCount,
    /// Write address, starts the channel.
    WriteAddressTrigger,
    /// Read address, starts the channel.
    ReadAddressTrigger,
}

impl ChannelRegister {
    /// Offset inside the channel block.
    #[must_use]
    pub const fn offset(self) -> u32 {
        match self {
            Self::TransferCount => regs::TRANS_COUNT,
            Self::WriteAddressTrigger => regs::AL2_WRITE_ADDR_TRIG,
            Self::ReadAddressTrigger => regs::AL3_READ_ADDR_TRIG,
        }
    }

    /// True if writing this register starts the channel.
    #[must_use]
    pub const fn triggers(self) -> bool {
        !matches!(self, Self::TransferCount)
    }
}

/// Bus address of `reg` in channel `channel`.
#[must_use]
pub const fn register_address(channel: u8, reg: ChannelRegister) -> u32 {
    DMA_BASE + channel as u32 * CHANNEL_STRIDE + reg.offset()
}

/// Decode a DMA register address into `(channel, register)`.
///
/// Only the registers listed in [`ChannelRegister`] are recognised.
#[must_use]
pub fn decode_register(addr: u32) -> Option<(u8, ChannelRegister)> {
    let rel = addr.checked_sub(DMA_BASE)?;
    let channel = u8::try_from(rel / CHANNEL_STRIDE).ok()?;
    if usize::from(channel) >= CHANNELS {
        return None;
    }
    let reg = match rel % CHANNEL_STRIDE {
        regs::TRANS_COUNT | regs::AL2_TRANS_COUNT | regs::AL3_TRANS_COUNT => {
            ChannelRegister::TransferCount
        }
        regs::AL2_WRITE_ADDR_TRIG => ChannelRegister::WriteAddressTrigger,
        regs::AL3_READ_ADDR_TRIG => ChannelRegister::ReadAddressTrigger,
        _ => return None,
    };
    Some((channel, reg))
}

/// Size of one transfer beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferSize {
    /// 16-bit halfword.
    Halfword,
    /// 32-bit word.
    #[default]
    Word,
}

impl TransferSize {
    /// Address increment per beat, in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Halfword => 2,
            Self::Word => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_aliases() {
        assert_eq!(register_address(0, ChannelRegister::TransferCount), 0x5000_0008);
        assert_eq!(register_address(1, ChannelRegister::WriteAddressTrigger), 0x5000_006c);
        assert_eq!(register_address(11, ChannelRegister::ReadAddressTrigger), 0x5000_02fc);
        assert!(ChannelRegister::WriteAddressTrigger.triggers());
        assert!(!ChannelRegister::TransferCount.triggers());
    }

    #[test]
    fn decode_matches_encode() {
        for ch in 0..CHANNELS as u8 {
            for reg in [
                ChannelRegister::TransferCount,
                ChannelRegister::WriteAddressTrigger,
                ChannelRegister::ReadAddressTrigger,
            ] {
                assert_eq!(decode_register(register_address(ch, reg)), Some((ch, reg)));
            }
        }
        assert_eq!(decode_register(DMA_BASE + 12 * CHANNEL_STRIDE), None);
        assert_eq!(decode_register(DMA_BASE + regs::CTRL_TRIG), None);
    }
}
