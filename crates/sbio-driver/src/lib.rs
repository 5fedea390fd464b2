//! Host-side driver for a two-pin serial RAM bridge.
//!
//! An RP2040 exposes a 128 KB buffer of its SRAM to an FPGA over two pairs of
//! serial pins. Six PIO lanes carry tagged words; six chained DMA channels
//! turn the tags into bursts into and out of the buffer without the CPU.
//! Between bursts, the same lanes carry control messages that program the
//! FPGA's transaction table and read back its receive ring.
//!
//! # Layers
//!
//! ```text
//! BridgeContext      bring-up, mode rules, sessions
//!   ├─ ConfigController + PendingReply   CONFIG-mode messages
//!   ├─ TransactionTable                  RUN-mode schedule
//!   ├─ RingReader / RingDrain            receive ring
//!   ├─ DmaChain / ChainTracker           write and read chains
//!   ├─ LaneRegistry                      six PIO lanes
//!   └─ Scheduler                         cooperative waits
//! BridgeBackend      PIO, DMA and bus primitives
//!   └─ SoftwareBackend                   simulated board + peer device
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use sbio_driver::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::from_env()?;
//! let backend = SoftwareBackend::new(&config);
//! let mut bridge = bridge_init(backend, config).map_err(|failure| failure.error)?;
//!
//! let mut table = TransactionTable::new(bridge.config());
//! table.write_burst(5, &[0x1234])?;
//! bridge.run_session(&table, 2_000)?;
//! assert_eq!(bridge.buffer().get(5), 0x1234);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod bridge;
mod buffer;
mod config;
mod controller;
pub mod dma;
mod error;
pub mod lanes;
mod ring;
pub mod scheduler;
mod table;

pub use backend::{BridgeBackend, ChannelConfig, ChannelSetup, ChannelStatus};
pub use backends::SoftwareBackend;
pub use bridge::{bridge_init, BridgeContext, Health, InitFailure, SessionReport};
pub use buffer::SharedBuffer;
pub use config::BridgeConfig;
pub use controller::{ConfigController, EntryReply, Mode, PendingReply};
pub use dma::{ChainEvent, ChainState, ChainTracker, Direction, DmaChain};
pub use error::{BridgeError, Resource, Result};
pub use lanes::{Lane, LaneRegistry, LaneRole};
pub use ring::{RingDrain, RingEntry, RingReader};
pub use scheduler::Scheduler;
pub use table::{SlotTiming, TableEntry, TransactionKind, TransactionTable};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        bridge_init, BridgeBackend, BridgeConfig, BridgeContext, BridgeError, Direction, Mode,
        Result, RingEntry, RingReader, SoftwareBackend, TransactionTable,
    };
    pub use sbio_chip::ring::RingIndex;
}
