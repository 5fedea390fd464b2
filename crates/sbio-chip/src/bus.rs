//! System bus layout relevant to the bridge.
//!
//! ```text
//! Region        Base          Size     Purpose
//! ───────────── ───────────── ──────── ─────────────────────────────────────
//! SRAM          0x2000_0000   264 KB   Striped main SRAM, holds the buffer
//! DMA           0x5000_0000   4 KB     12 channels × 0x40 register blocks
//! PIO0          0x5020_0000   4 KB     4 state machines, 32 instructions
//! PIO1          0x5030_0000   4 KB     4 state machines, 32 instructions
//! BUSCTRL       0x4003_0000   —        Bus priority register
//! ```
//!
//! The address lanes emit complete bus addresses: the PIO program shifts the
//! 16-bit word offset left by one and ORs in a seed holding the upper
//! `32 - BUFFER_ALIGN_SHIFT` address bits. The shared buffer therefore has to
//! start on a `1 << BUFFER_ALIGN_SHIFT` boundary.

/// Main SRAM base address.
pub const SRAM_BASE: u32 = 0x2000_0000;

/// Main SRAM size in bytes (264 KB).
pub const SRAM_SIZE: u32 = 264 * 1024;

/// Number of 16-bit cells in the shared buffer.
pub const BUFFER_WORDS: usize = 65_536;

/// Size of the shared buffer in bytes.
pub const BUFFER_BYTES: u32 = (BUFFER_WORDS * 2) as u32;

/// Alignment of the shared buffer, as a shift. The address lane seed is
/// `base >> BUFFER_ALIGN_SHIFT`.
pub const BUFFER_ALIGN_SHIFT: u32 = 17;

/// Default shared buffer base: the first aligned 128 KB window in SRAM.
pub const DEFAULT_BUFFER_BASE: u32 = SRAM_BASE + (1 << BUFFER_ALIGN_SHIFT);

/// Bus priority register.
pub const BUSCTRL_PRIORITY: u32 = 0x4003_0000;

/// Bus priority bits.
pub mod priority {
    /// Core 0 high priority.
    pub const PROC0: u32 = 1 << 0;
    /// Core 1 high priority.
    pub const PROC1: u32 = 1 << 4;
    /// DMA read port high priority.
    pub const DMA_R: u32 = 1 << 8;
    /// DMA write port high priority.
    pub const DMA_W: u32 = 1 << 12;
}

/// True if `base` is a usable shared buffer base: aligned, and the whole
/// buffer fits inside SRAM.
#[must_use]
pub const fn is_valid_buffer_base(base: u32) -> bool {
    let aligned = base & ((1 << BUFFER_ALIGN_SHIFT) - 1) == 0;
    let end = base as u64 + BUFFER_BYTES as u64;
    aligned && base >= SRAM_BASE && end <= SRAM_BASE as u64 + SRAM_SIZE as u64
}

/// Address seed loaded into an address lane for a buffer at `base`.
#[must_use]
pub const fn address_seed(base: u32) -> u32 {
    base >> BUFFER_ALIGN_SHIFT
}

/// Bus address of buffer cell `offset` for a buffer at `base`.
#[must_use]
pub const fn cell_address(base: u32, offset: u16) -> u32 {
    base | ((offset as u32) << 1)
}
