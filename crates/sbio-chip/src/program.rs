//! Serial lane programs.
//!
//! The bit-level PIO programs are treated as black boxes: each one moves one
//! 16-bit wire word per cycle budget between two pins and a FIFO. What the
//! bridge needs to know about them is how many instruction slots they occupy,
//! which direction they run in, and which two-bit wire header they accept.
//!
//! ```text
//! program        slots  dir  header  used by
//! ────────────── ────── ──── ─────── ───────────────────────────────
//! sbio2_tx          9   tx   —       read-data
//! sbio2_rx_10       8   rx   10      write-data
//! sbio2_rx_00       8   rx   00      write-count, read-count (clone)
//! sbio2_rx_addr_01 10   rx   01      write-addr,  read-addr  (clone)
//! ```
//!
//! Write-side lanes sample their header on the first receive pin, read-side
//! lanes on the second one. The two-bit header a lane sees is the pin's share
//! of the four-bit transaction tag (see [`crate::wire::PayloadTag`]).

/// Number of pins per serial lane.
pub const PINS: u8 = 2;

/// GPIO pins available to the lanes (0..30).
pub const GPIO_COUNT: u8 = 30;

/// Data cycles per wire word.
pub const DATA_CYCLES: u8 = 8;

/// Header cycles preceding the data in run mode.
pub const HEADER_CYCLES: u8 = 2;

/// Total cycles one run-mode word occupies on the wire.
pub const WORD_CYCLES: u8 = HEADER_CYCLES + DATA_CYCLES;

/// Pin pair base for device → host lanes.
pub const DEFAULT_RX_PIN_BASE: u8 = 0;

/// Pin pair base for host → device lanes.
pub const DEFAULT_TX_PIN_BASE: u8 = 4;

/// Direction a program moves words in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// Host → device: shifts TX FIFO words out.
    Transmit,
    /// Device → host: shifts words matching its header into the RX FIFO.
    Receive,
    /// Device → host address lane: like `Receive`, but combines each word
    /// with a seed pulled once from its TX FIFO into a full bus address.
    ReceiveAddress,
}

/// Static description of a serial lane program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialProgram {
    /// Program name, as in the assembled image.
    pub name: &'static str,
    /// Instruction slots occupied.
    pub length: u8,
    /// Transfer direction.
    pub kind: ProgramKind,
    /// Two-bit header accepted (receive programs only).
    pub header: Option<u8>,
}

/// Host → device transmitter.
pub const SBIO2_TX: SerialProgram = SerialProgram {
    name: "sbio2_tx",
    length: 9,
    kind: ProgramKind::Transmit,
    header: None,
};

/// Receiver for header `10` (data).
pub const SBIO2_RX_10: SerialProgram = SerialProgram {
    name: "sbio2_rx_10",
    length: 8,
    kind: ProgramKind::Receive,
    header: Some(0b10),
};

/// Receiver for header `00` (transfer count).
pub const SBIO2_RX_00: SerialProgram = SerialProgram {
    name: "sbio2_rx_00",
    length: 8,
    kind: ProgramKind::Receive,
    header: Some(0b00),
};

/// Receiver for header `01` (address), emitting seeded bus addresses.
pub const SBIO2_RX_ADDR_01: SerialProgram = SerialProgram {
    name: "sbio2_rx_addr_01",
    length: 10,
    kind: ProgramKind::ReceiveAddress,
    header: Some(0b01),
};

/// Pin assignment of one state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanePins {
    /// First data pin (the lane uses `PINS` consecutive pins).
    pub data_base: u8,
    /// Pin the receive program watches for its header.
    pub header_pin: u8,
}

impl LanePins {
    /// Pins for a transmit lane.
    #[must_use]
    pub const fn transmit(tx_pin_base: u8) -> Self {
        Self {
            data_base: tx_pin_base,
            header_pin: tx_pin_base,
        }
    }

    /// Pins for a receive lane watching header pin `rx_pin_base + pin`.
    #[must_use]
    pub const fn receive(rx_pin_base: u8, pin: u8) -> Self {
        Self {
            data_base: rx_pin_base,
            header_pin: rx_pin_base.wrapping_add(pin),
        }
    }
}
