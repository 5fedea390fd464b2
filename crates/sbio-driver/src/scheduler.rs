//! Cooperative poll loop
//!
//! The bridge has no threads. Every wait (room in a TX FIFO, a reply in an
//! RX FIFO, the end of a run window) is a poll loop whose every iteration is
//! one scheduler tick: let the backend advance, then service host I/O. That
//! keeps USB serviced while blocked and gives every wait a deadline.

use crate::backend::BridgeBackend;
use crate::error::{BridgeError, Result};
use tracing::trace;

/// Tick counter shared by every wait
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    ticks: u64,
}

impl Scheduler {
    /// Fresh scheduler
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    /// One iteration: advance the backend, then service I/O
    pub fn tick<B: BridgeBackend>(&mut self, backend: &mut B) {
        backend.advance();
        backend.service_io();
        self.ticks += 1;
    }

    /// Poll `ready` until it yields a value or `timeout_us` passes
    ///
    /// `ready` is always polled at least once.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] when the deadline passes.
    pub fn block_on<B, T, F>(&mut self, backend: &mut B, timeout_us: u64, mut ready: F) -> Result<T>
    where
        B: BridgeBackend,
        F: FnMut(&mut B) -> Option<T>,
    {
        let deadline = backend.now_us().saturating_add(timeout_us);
        let start = self.ticks;
        loop {
            if let Some(value) = ready(backend) {
                trace!("Poll ready after {} ticks", self.ticks - start);
                return Ok(value);
            }
            if backend.now_us() >= deadline {
                return Err(BridgeError::Timeout {
                    duration_us: timeout_us,
                });
            }
            self.tick(backend);
        }
    }

    /// Keep ticking for `duration_us`
    pub fn idle_for<B: BridgeBackend>(&mut self, backend: &mut B, duration_us: u64) {
        let deadline = backend.now_us().saturating_add(duration_us);
        while backend.now_us() < deadline {
            self.tick(backend);
        }
    }

    /// Ticks since creation
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SoftwareBackend;

    #[test]
    fn block_on_returns_first_ready_value() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut sched = Scheduler::new();
        let mut polls = 0;
        let v = sched
            .block_on(&mut backend, 1_000, |_| {
                polls += 1;
                (polls == 3).then_some(polls)
            })
            .unwrap();
        assert_eq!(v, 3);
        assert_eq!(sched.ticks(), 2);
        assert_eq!(backend.io_services(), 2);
    }

    #[test]
    fn block_on_times_out() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut sched = Scheduler::new();
        let err = sched
            .block_on(&mut backend, 10, |_| None::<()>)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { duration_us: 10 }));
        assert!(backend.now_us() >= 10);
    }

    #[test]
    fn idle_for_advances_clock() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut sched = Scheduler::new();
        sched.idle_for(&mut backend, 20);
        assert_eq!(backend.now_us(), 20);
    }
}
