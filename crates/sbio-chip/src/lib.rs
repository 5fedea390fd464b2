//! Silicon and wire model for the SBIO serial RAM bridge.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the host microcontroller as the bridge sees it (bus address
//! map, PIO and DMA resource pools, DREQ numbering) plus the serial wire
//! protocol spoken with the FPGA.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`bus`] | SRAM window, shared buffer alignment, bus priority bits |
//! | [`pio`] | PIO blocks, state machines, FIFO register addresses, DREQ numbers |
//! | [`dma`] | DMA channel register map and write-trigger aliases |
//! | [`program`] | Serial lane program descriptors (black-box PIO images) |
//! | [`wire`] | Control message codec, transaction payload tags, register split |
//! | [`ring`] | 10-bit wrapping ring index |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod dma;
pub mod pio;
pub mod program;
pub mod ring;
pub mod wire;
