//! Bridge backend implementations
//!
//! - **Software**: cycle-stepped simulation of the PIO blocks, DMA, shared
//!   buffer and peer device; runs anywhere and backs the test suite.

pub mod software;

pub use software::SoftwareBackend;
