//! Bridge configuration
//!
//! Pin assignment, buffer placement and the timing margins of the serial
//! protocol. The timing margins (slot count and delay, extra delay on read
//! addresses, reply timeout) were tuned empirically on one board and are
//! calibration values, not protocol constants: every field can be overridden
//! from the environment.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SBIO_RX_PIN_BASE` | `rx_pin_base` |
//! | `SBIO_TX_PIN_BASE` | `tx_pin_base` |
//! | `SBIO_BUFFER_BASE` | `buffer_base` (decimal or `0x` hex) |
//! | `SBIO_SLOT_COUNT` | `slot_count` |
//! | `SBIO_SLOT_DELAY` | `slot_delay` |
//! | `SBIO_FIRST_READ_DELAY` | `first_read_extra_delay` |
//! | `SBIO_READ_DELAY` | `read_extra_delay` |
//! | `SBIO_TX_COUNTDOWN` | `tx_countdown` |
//! | `SBIO_REPLY_TIMEOUT_US` | `reply_timeout_us` |
//! | `SBIO_RUN_WINDOW_US` | `run_window_us` |

use crate::error::{BridgeError, Result};
use sbio_chip::bus;
use sbio_chip::program::{self, GPIO_COUNT, PINS};
use sbio_chip::wire::CONTROL_DATA_BITS;
use std::str::FromStr;
use tracing::debug;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// First of the two device → host pins
    pub rx_pin_base: u8,

    /// First of the two host → device pins
    pub tx_pin_base: u8,

    /// Shared buffer base address (128 KB aligned)
    pub buffer_base: u32,

    /// Cycle count written for every table slot (one run-mode word)
    pub slot_count: u32,

    /// Delay cycles written for every table slot
    pub slot_delay: u32,

    /// Extra delay on the first read address of a session, covering the
    /// read chain's re-arm latency
    pub first_read_extra_delay: u32,

    /// Extra delay on later read addresses
    pub read_extra_delay: u32,

    /// Countdown before the first slot fires in run mode
    pub tx_countdown: u32,

    /// Deadline for one device reply (µs)
    pub reply_timeout_us: u64,

    /// How long a session stays in run mode (µs)
    pub run_window_us: u64,

    /// Enable the DMA chain right after bring-up
    pub start_dma: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rx_pin_base: program::DEFAULT_RX_PIN_BASE,
            tx_pin_base: program::DEFAULT_TX_PIN_BASE,
            buffer_base: bus::DEFAULT_BUFFER_BASE,
            slot_count: u32::from(program::WORD_CYCLES),
            slot_delay: 1,
            first_read_extra_delay: 12,
            read_extra_delay: 0,
            tx_countdown: 0,
            reply_timeout_us: 65_536,
            run_window_us: 65_536,
            start_dma: false,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `SBIO_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but does not parse, or if the
    /// resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        env_override("SBIO_RX_PIN_BASE", &mut cfg.rx_pin_base)?;
        env_override("SBIO_TX_PIN_BASE", &mut cfg.tx_pin_base)?;
        if let Ok(raw) = std::env::var("SBIO_BUFFER_BASE") {
            cfg.buffer_base = parse_address(&raw)?;
        }
        env_override("SBIO_SLOT_COUNT", &mut cfg.slot_count)?;
        env_override("SBIO_SLOT_DELAY", &mut cfg.slot_delay)?;
        env_override("SBIO_FIRST_READ_DELAY", &mut cfg.first_read_extra_delay)?;
        env_override("SBIO_READ_DELAY", &mut cfg.read_extra_delay)?;
        env_override("SBIO_TX_COUNTDOWN", &mut cfg.tx_countdown)?;
        env_override("SBIO_REPLY_TIMEOUT_US", &mut cfg.reply_timeout_us)?;
        env_override("SBIO_RUN_WINDOW_US", &mut cfg.run_window_us)?;
        cfg.validate()?;
        debug!("Bridge config from environment: {cfg:?}");
        Ok(cfg)
    }

    /// Check pin and buffer placement and slot timing
    ///
    /// # Errors
    ///
    /// Returns error if the buffer base is misaligned or outside SRAM, a pin
    /// pair runs past the last GPIO or overlaps the other, the slot count is
    /// zero, or a timing value does not fit a 12-bit control message.
    pub fn validate(&self) -> Result<()> {
        if !bus::is_valid_buffer_base(self.buffer_base) {
            return Err(BridgeError::invalid_config(format!(
                "buffer base {:#010x} must be {} KB aligned and inside SRAM",
                self.buffer_base,
                (1u32 << bus::BUFFER_ALIGN_SHIFT) / 1024
            )));
        }
        for (side, base) in [("rx", self.rx_pin_base), ("tx", self.tx_pin_base)] {
            if !matches!(base.checked_add(PINS), Some(end) if end <= GPIO_COUNT) {
                return Err(BridgeError::invalid_config(format!(
                    "{side} pins {base}..{base}+{PINS} exceed the {GPIO_COUNT} GPIOs"
                )));
            }
        }
        let rx = self.rx_pin_base..self.rx_pin_base.saturating_add(PINS);
        let tx = self.tx_pin_base..self.tx_pin_base.saturating_add(PINS);
        if rx.start < tx.end && tx.start < rx.end {
            return Err(BridgeError::invalid_config(format!(
                "rx pins {rx:?} overlap tx pins {tx:?}"
            )));
        }
        if self.slot_count == 0 {
            return Err(BridgeError::invalid_config("slot count must be non-zero"));
        }
        let max = (1u32 << CONTROL_DATA_BITS) - 1;
        let timing = [
            ("slot count", Some(self.slot_count)),
            ("slot delay", Some(self.slot_delay)),
            ("first read delay", self.slot_delay.checked_add(self.first_read_extra_delay)),
            ("read delay", self.slot_delay.checked_add(self.read_extra_delay)),
            ("tx countdown", Some(self.tx_countdown)),
        ];
        for (name, value) in timing {
            if !matches!(value, Some(v) if v <= max) {
                return Err(BridgeError::invalid_config(format!(
                    "{name} exceeds {max} cycles"
                )));
            }
        }
        Ok(())
    }

    /// Configuration for quick simulated sessions: short run window
    #[must_use]
    pub fn with_run_window_us(mut self, us: u64) -> Self {
        self.run_window_us = us;
        self
    }
}

fn env_override<T: FromStr>(name: &str, field: &mut T) -> Result<()> {
    if let Ok(raw) = std::env::var(name) {
        *field = raw
            .trim()
            .parse()
            .map_err(|_| BridgeError::invalid_config(format!("{name}={raw:?} does not parse")))?;
    }
    Ok(())
}

fn parse_address(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| BridgeError::invalid_config(format!("SBIO_BUFFER_BASE={raw:?} does not parse")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = BridgeConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.slot_count, 10);
        assert_eq!(cfg.first_read_extra_delay, 12);
    }

    #[test]
    fn misaligned_buffer_is_rejected() {
        let cfg = BridgeConfig {
            buffer_base: bus::DEFAULT_BUFFER_BASE + 0x100,
            ..BridgeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BridgeError::InvalidConfig { .. })));
    }

    #[test]
    fn overlapping_pins_are_rejected() {
        let cfg = BridgeConfig {
            rx_pin_base: 3,
            tx_pin_base: 4,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn pins_past_last_gpio_are_rejected() {
        let cfg = BridgeConfig {
            rx_pin_base: 255,
            ..BridgeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BridgeError::InvalidConfig { .. })));
        let cfg = BridgeConfig {
            tx_pin_base: 29,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = BridgeConfig {
            tx_pin_base: 28,
            ..BridgeConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn timing_must_fit_control_messages() {
        let cfg = BridgeConfig {
            slot_delay: 0x1000,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
        // the first read address carries slot delay plus its extra delay
        let cfg = BridgeConfig {
            slot_delay: 0xFF8,
            ..BridgeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BridgeError::InvalidConfig { .. })));
        let cfg = BridgeConfig {
            read_extra_delay: u32::MAX,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = BridgeConfig {
            slot_count: 0xFFF,
            tx_countdown: 0xFFF,
            ..BridgeConfig::default()
        };
        cfg.validate().unwrap();
    }

    #[test]
    fn address_parsing() {
        assert_eq!(parse_address("0x2002_0000").unwrap(), 0x2002_0000);
        assert_eq!(parse_address("536870912").unwrap(), 0x2000_0000);
        assert!(parse_address("sram").is_err());
    }
}
