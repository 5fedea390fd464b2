//! Wire codec.
//!
//! ## Configuration mode
//!
//! Host → device words are control messages:
//!
//! ```text
//!  15            4 3      0
//! ┌───────────────┬────────┐
//! │  data (12)    │ hdr(4) │
//! └───────────────┴────────┘
//! ```
//!
//! Device → host replies carry a bare value and are not validated.
//!
//! ## Transaction payloads
//!
//! A transaction table slot holds up to [`MAX_TX_BITS`] bits:
//!
//! ```text
//!  23                 4  3   2   1   0
//! ┌────────────────────┬───┬───┬───┬───┐
//! │     value (20)     │ r │ w │ r │ w │
//! └────────────────────┴───┴───┴───┴───┘
//! ```
//!
//! The write-side tag sits at bit 0 and the read-side tag is the same code
//! shifted left by one. Tag codes only use bits 0 and 2, so the write tag
//! lands on bits {0, 2} and the read tag on bits {1, 3}: one register
//! carries two independent tags. A payload wider than [`CONTROL_DATA_BITS`]
//! is written as a low register then a high register.

use std::fmt;

/// Bits per wire word (2 pins × 8 data cycles).
pub const WORD_BITS: u32 = 16;

/// Header bits of a control message.
pub const CONTROL_HEADER_BITS: u32 = 4;

/// Data bits of a control message.
pub const CONTROL_DATA_BITS: u32 = WORD_BITS - CONTROL_HEADER_BITS;

/// Header bits of a transaction payload (two interleaved tags).
pub const TX_HEADER_BITS: u32 = 4;

/// Widest transaction payload a slot stores.
pub const MAX_TX_BITS: u32 = 24;

/// Widest value a transaction payload carries.
pub const MAX_TX_VALUE_BITS: u32 = MAX_TX_BITS - TX_HEADER_BITS;

const CONTROL_HEADER_MASK: u32 = (1 << CONTROL_HEADER_BITS) - 1;
const CONTROL_DATA_MASK: u32 = (1 << CONTROL_DATA_BITS) - 1;

/// Errors from encoding wire words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Header does not fit in four bits.
    HeaderOutOfRange(u8),
    /// Header is a four-bit value without an assigned operation.
    UnknownHeader(u8),
    /// Transaction value wider than the payload allows.
    ValueTooWide {
        /// Offending value.
        value: u32,
        /// Available bits.
        bits: u32,
    },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderOutOfRange(h) => write!(f, "control header {h} does not fit in 4 bits"),
            Self::UnknownHeader(h) => write!(f, "control header {h} has no assigned operation"),
            Self::ValueTooWide { value, bits } => {
                write!(f, "value {value:#x} does not fit in {bits} payload bits")
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Control message operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlHeader {
    /// First slot to execute in run mode.
    SetTxIndex = 0,
    /// Slot at which run-mode execution stops.
    SetTxStopIndex = 1,
    /// Countdown before the first slot fires.
    SetTxCountdown = 2,
    /// Select the slot that following slot writes apply to.
    SetSlotIndex = 3,
    /// Delay cycles after the selected slot.
    SetSlotDelay = 4,
    /// Cycle count of the selected slot.
    SetSlotCount = 5,
    /// Low [`CONTROL_DATA_BITS`] of the selected slot's payload.
    SetSlotPayloadLow = 6,
    /// High bits of the selected slot's payload.
    SetSlotPayloadHigh = 7,
    /// Reset the receive ring head.
    SetRxCursor = 8,
    /// Reply with the receive ring head.
    ReadRxHead = 9,
    /// Reply with the payload stored at a ring index.
    ReadRxPayload = 10,
    /// Reply with the timestamp stored at a ring index.
    ReadRxTimestamp = 11,
}

impl ControlHeader {
    /// All operation codes in numeric order.
    pub const ALL: [Self; 12] = [
        Self::SetTxIndex,
        Self::SetTxStopIndex,
        Self::SetTxCountdown,
        Self::SetSlotIndex,
        Self::SetSlotDelay,
        Self::SetSlotCount,
        Self::SetSlotPayloadLow,
        Self::SetSlotPayloadHigh,
        Self::SetRxCursor,
        Self::ReadRxHead,
        Self::ReadRxPayload,
        Self::ReadRxTimestamp,
    ];

    /// Numeric opcode.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for the read-request family (the device replies).
    #[must_use]
    pub const fn expects_reply(self) -> bool {
        matches!(
            self,
            Self::ReadRxHead | Self::ReadRxPayload | Self::ReadRxTimestamp
        )
    }
}

impl TryFrom<u8> for ControlHeader {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        if u32::from(code) > CONTROL_HEADER_MASK {
            return Err(WireError::HeaderOutOfRange(code));
        }
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(WireError::UnknownHeader(code))
    }
}

/// A decoded control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    /// Operation.
    pub header: ControlHeader,
    /// Data field (only the low [`CONTROL_DATA_BITS`] reach the device).
    pub data: u32,
}

impl ControlMessage {
    /// Build a message.
    #[must_use]
    pub const fn new(header: ControlHeader, data: u32) -> Self {
        Self { header, data }
    }

    /// Encode into a wire word.
    #[must_use]
    pub const fn encode(self) -> u32 {
        (self.header as u32) | ((self.data & CONTROL_DATA_MASK) << CONTROL_HEADER_BITS)
    }

    /// Decode a received wire word.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownHeader`] for the four unassigned codes.
    pub fn decode(word: u32) -> Result<Self, WireError> {
        let header = ControlHeader::try_from(header_of(word))?;
        Ok(Self {
            header,
            data: decode(word),
        })
    }
}

/// Pack a raw four-bit header and data into a control word.
///
/// Data bits beyond [`CONTROL_DATA_BITS`] are dropped, as the wire word only
/// carries [`WORD_BITS`].
///
/// # Errors
///
/// Returns [`WireError::HeaderOutOfRange`] if `header >= 16`.
pub fn encode_control(header: u8, data: u32) -> Result<u32, WireError> {
    if u32::from(header) > CONTROL_HEADER_MASK {
        return Err(WireError::HeaderOutOfRange(header));
    }
    Ok(u32::from(header) | ((data & CONTROL_DATA_MASK) << CONTROL_HEADER_BITS))
}

/// Data field of a control word.
#[must_use]
pub const fn decode(word: u32) -> u32 {
    (word >> CONTROL_HEADER_BITS) & CONTROL_DATA_MASK
}

/// Header field of a control word.
#[must_use]
pub const fn header_of(word: u32) -> u8 {
    (word & CONTROL_HEADER_MASK) as u8
}

/// Value of a device reply word. Replies are trusted and passed through.
#[must_use]
pub const fn reply_value(word: u32) -> u32 {
    word
}

/// Transaction tag codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadTag {
    /// Burst length for the following address.
    TransferCount = 0,
    /// Buffer offset; starts a burst.
    Address = 1,
    /// Literal data word.
    Data = 4,
    /// Lane idle for this slot.
    None = 5,
}

impl PayloadTag {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decode a tag from a three-bit field using only bits 0 and 2.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code & 0b101 {
            0 => Self::TransferCount,
            1 => Self::Address,
            4 => Self::Data,
            _ => Self::None,
        }
    }
}

/// Pack a transaction payload.
///
/// # Errors
///
/// Returns [`WireError::ValueTooWide`] if `value` exceeds
/// [`MAX_TX_VALUE_BITS`].
pub fn pack_transaction(write: PayloadTag, read: PayloadTag, value: u32) -> Result<u32, WireError> {
    if value >> MAX_TX_VALUE_BITS != 0 {
        return Err(WireError::ValueTooWide {
            value,
            bits: MAX_TX_VALUE_BITS,
        });
    }
    Ok((value << TX_HEADER_BITS) | write.code() | (read.code() << 1))
}

/// Unpack a transaction payload into `(write tag, read tag, value)`.
#[must_use]
pub const fn unpack_transaction(payload: u32) -> (PayloadTag, PayloadTag, u32) {
    let tags = payload & ((1 << TX_HEADER_BITS) - 1);
    (
        PayloadTag::from_code(tags),
        PayloadTag::from_code(tags >> 1),
        payload >> TX_HEADER_BITS,
    )
}

/// Split a slot payload into the low and high register values, in send
/// order.
#[must_use]
pub const fn split_payload(payload: u32) -> (u32, u32) {
    (
        payload & CONTROL_DATA_MASK,
        (payload >> CONTROL_DATA_BITS) & CONTROL_DATA_MASK,
    )
}

/// Reassemble a slot payload from its low and high register values.
#[must_use]
pub const fn join_payload(low: u32, high: u32) -> u32 {
    (low & CONTROL_DATA_MASK) | ((high & CONTROL_DATA_MASK) << CONTROL_DATA_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_round_trip_every_header() {
        for h in 0..16u8 {
            for v in [0, 1, 0x2a5, 0x800, CONTROL_DATA_MASK] {
                let word = encode_control(h, v).unwrap();
                assert_eq!(decode(word), v);
                assert_eq!(header_of(word), h);
                assert!(word < 1 << WORD_BITS);
            }
        }
    }

    #[test]
    fn header_out_of_range_is_rejected() {
        assert_eq!(encode_control(16, 0), Err(WireError::HeaderOutOfRange(16)));
        assert_eq!(ControlHeader::try_from(12u8), Err(WireError::UnknownHeader(12)));
        assert_eq!(ControlHeader::try_from(11u8), Ok(ControlHeader::ReadRxTimestamp));
    }

    #[test]
    fn typed_message_matches_raw_encoding() {
        for header in ControlHeader::ALL {
            let msg = ControlMessage::new(header, 0x123);
            assert_eq!(msg.encode(), encode_control(header.code(), 0x123).unwrap());
            assert_eq!(ControlMessage::decode(msg.encode()), Ok(msg));
        }
    }

    #[test]
    fn wide_payload_split_reassembles() {
        for payload in [0x1000, 0x12_3456, 0xFF_FFFF, 0x80_0001, 0xABC_DEF & 0xFF_FFFF] {
            let (low, high) = split_payload(payload);
            assert!(low < 1 << CONTROL_DATA_BITS);
            assert_eq!(low | (high << CONTROL_DATA_BITS), payload);
            assert_eq!(join_payload(low, high), payload);
        }
    }

    #[test]
    fn tags_occupy_disjoint_bits() {
        let tags = [
            PayloadTag::TransferCount,
            PayloadTag::Address,
            PayloadTag::Data,
            PayloadTag::None,
        ];
        for w in tags {
            for r in tags {
                let payload = pack_transaction(w, r, 0x1234).unwrap();
                assert_eq!(w.code() & (r.code() << 1), 0);
                assert_eq!(unpack_transaction(payload), (w, r, 0x1234));
            }
        }
    }

    #[test]
    fn write_data_payload_layout() {
        // data 0x1234 on the write side, read side idle: 0x1234 << 4 | 4 | 5 << 1
        let payload = pack_transaction(PayloadTag::Data, PayloadTag::None, 0x1234).unwrap();
        assert_eq!(payload, 0x1_234E);
        assert!(pack_transaction(PayloadTag::Data, PayloadTag::None, 1 << 20).is_err());
    }
}
