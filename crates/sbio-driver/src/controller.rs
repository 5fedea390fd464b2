//! Configuration controller
//!
//! In CONFIG mode the read-data lane carries control messages to the device
//! and the write-data lane carries its replies back. A [`ConfigController`]
//! is a short-lived view over the bridge that owns both lanes for as long as
//! it lives; [`crate::BridgeContext::controller`] only hands one out while
//! the bridge is healthy, in CONFIG mode, with the DMA chain disabled.
//!
//! Read requests return a [`PendingReply`] that keeps the controller
//! borrowed until the reply is consumed, so requests cannot interleave.
//! Reply words still owed to a request that timed out are counted by the
//! bridge; the next request waits for them and drops them before it sends.

use crate::backend::BridgeBackend;
use crate::error::{BridgeError, Result};
use crate::lanes::{Lane, LaneRegistry, LaneRole};
use crate::scheduler::Scheduler;
use sbio_chip::ring::RingIndex;
use sbio_chip::wire::{self, ControlHeader, ControlMessage, WireError, CONTROL_DATA_BITS};
use tracing::{trace, warn};

/// Protocol mode, driven on the mode signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Lanes carry control messages and replies
    #[default]
    Config,
    /// Lanes carry tagged transactions; DMA owns them
    Run,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => f.pad("CONFIG"),
            Self::Run => f.pad("RUN"),
        }
    }
}

/// Payload and timestamp of one ring entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryReply {
    /// Received word
    pub payload: u32,
    /// Device cycle timestamp
    pub timestamp: u32,
}

/// Control message sender and reply reader
#[derive(Debug)]
pub struct ConfigController<'a, B: BridgeBackend> {
    backend: &'a mut B,
    scheduler: &'a mut Scheduler,
    tx: Lane,
    rx: Lane,
    owed: &'a mut usize,
    reply_timeout_us: u64,
}

impl<'a, B: BridgeBackend> ConfigController<'a, B> {
    pub(crate) fn new(
        backend: &'a mut B,
        scheduler: &'a mut Scheduler,
        lanes: &LaneRegistry,
        owed: &'a mut usize,
        reply_timeout_us: u64,
    ) -> Result<Self> {
        Ok(Self {
            tx: lanes.lane(LaneRole::ReadData)?,
            rx: lanes.lane(LaneRole::WriteData)?,
            backend,
            scheduler,
            owed,
            reply_timeout_us,
        })
    }

    /// Deadline applied by [`PendingReply::wait`]
    pub const fn reply_timeout_us(&self) -> u64 {
        self.reply_timeout_us
    }

    /// Reply words requested but not yet read
    pub fn owed_replies(&self) -> usize {
        *self.owed
    }

    /// Queue a raw word on the read-data lane, waiting for FIFO room
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if the FIFO stays full.
    pub fn send_raw(&mut self, word: u32) -> Result<()> {
        let Lane { pio, sm, .. } = self.tx;
        self.scheduler
            .block_on(self.backend, self.reply_timeout_us, |b| b.sm_try_put(pio, sm, word).then_some(()))
    }

    /// Wait for one raw word on the write-data lane
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if nothing arrives in time.
    pub fn receive_raw(&mut self, timeout_us: u64) -> Result<u32> {
        let Lane { pio, sm, .. } = self.rx;
        self.scheduler
            .block_on(self.backend, timeout_us, |b| b.sm_try_get(pio, sm))
    }

    /// Encode and send one control message
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Wire`] if the data does not fit in the
    /// 12-bit field, or a timeout from [`send_raw`](Self::send_raw).
    pub fn send(&mut self, msg: ControlMessage) -> Result<()> {
        if msg.data >> CONTROL_DATA_BITS != 0 {
            return Err(WireError::ValueTooWide {
                value: msg.data,
                bits: CONTROL_DATA_BITS,
            }
            .into());
        }
        trace!("Control {:?} {:#x}", msg.header, msg.data);
        self.send_raw(msg.encode())
    }

    fn send_op(&mut self, header: ControlHeader, data: u32) -> Result<()> {
        self.send(ControlMessage::new(header, data))
    }

    /// Write one slot of the device's transaction table
    ///
    /// Sends slot index, delay, count, then the payload low and high halves.
    ///
    /// # Errors
    ///
    /// Returns error if a field does not fit its control message.
    pub fn program_transaction(
        &mut self,
        slot: RingIndex,
        payload: u32,
        count: u32,
        delay: u32,
    ) -> Result<()> {
        if payload >> (2 * CONTROL_DATA_BITS) != 0 {
            return Err(WireError::ValueTooWide {
                value: payload,
                bits: 2 * CONTROL_DATA_BITS,
            }
            .into());
        }
        let (low, high) = wire::split_payload(payload);
        self.send_op(ControlHeader::SetSlotIndex, slot.into())?;
        self.send_op(ControlHeader::SetSlotDelay, delay)?;
        self.send_op(ControlHeader::SetSlotCount, count)?;
        self.send_op(ControlHeader::SetSlotPayloadLow, low)?;
        self.send_op(ControlHeader::SetSlotPayloadHigh, high)
    }

    /// Set the run-mode execution window and reset the receive ring head
    ///
    /// # Errors
    ///
    /// Returns error if the countdown does not fit its control message.
    pub fn arm(
        &mut self,
        start: RingIndex,
        stop: RingIndex,
        countdown: u32,
        rx_cursor: RingIndex,
    ) -> Result<()> {
        self.send_op(ControlHeader::SetTxIndex, start.into())?;
        self.send_op(ControlHeader::SetTxStopIndex, stop.into())?;
        self.send_op(ControlHeader::SetTxCountdown, countdown)?;
        self.send_op(ControlHeader::SetRxCursor, rx_cursor.into())
    }

    /// Ask for the receive ring head
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent, or
    /// [`BridgeError::Timeout`] if replies owed to an earlier request never
    /// arrive.
    pub fn request_ring_head(&mut self) -> Result<PendingReply<'_, 'a, B, RingIndex>> {
        self.settle_owed_replies()?;
        self.send_reply_op(ControlHeader::ReadRxHead, 0)?;
        Ok(PendingReply::new(self, 1, |w| RingIndex::new(wire::reply_value(w[0]))))
    }

    /// Ask for the payload and timestamp stored at `index`
    ///
    /// # Errors
    ///
    /// Same as [`request_ring_head`](Self::request_ring_head).
    pub fn request_ring_entry(
        &mut self,
        index: RingIndex,
    ) -> Result<PendingReply<'_, 'a, B, EntryReply>> {
        self.settle_owed_replies()?;
        self.send_reply_op(ControlHeader::ReadRxPayload, index.into())?;
        self.send_reply_op(ControlHeader::ReadRxTimestamp, index.into())?;
        Ok(PendingReply::new(self, 2, |w| EntryReply {
            payload: wire::reply_value(w[0]),
            timestamp: wire::reply_value(w[1]),
        }))
    }

    /// Send a request the device answers with one reply word
    fn send_reply_op(&mut self, header: ControlHeader, data: u32) -> Result<()> {
        self.send_op(header, data)?;
        *self.owed += 1;
        Ok(())
    }

    /// Wait for reply words still owed to abandoned requests and drop them
    ///
    /// Without this a late reply would be taken as the answer to the next
    /// request.
    pub(crate) fn settle_owed_replies(&mut self) -> Result<()> {
        if *self.owed > 0 {
            let Lane { pio, sm, .. } = self.rx;
            let owed = &mut *self.owed;
            let settled = self.scheduler.block_on(self.backend, self.reply_timeout_us, |b| {
                while *owed > 0 {
                    let word = b.sm_try_get(pio, sm)?;
                    warn!("Discarding late reply {word:#x}");
                    *owed -= 1;
                }
                Some(())
            });
            if let Err(e) = settled {
                warn!("{} reply words still owed, refusing new request", *self.owed);
                return Err(e);
            }
        }
        self.discard_stale_replies();
        Ok(())
    }

    /// Drop words already in the reply FIFO
    ///
    /// Each dropped word settles one owed reply; words nobody asked for are
    /// dropped as well.
    pub fn discard_stale_replies(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(word) = self.backend.sm_try_get(self.rx.pio, self.rx.sm) {
            warn!("Discarding stale reply {word:#x}");
            *self.owed = self.owed.saturating_sub(1);
            dropped += 1;
        }
        dropped
    }
}

/// An outstanding read request
///
/// Holds the controller until the reply is taken with [`wait`](Self::wait),
/// [`wait_for`](Self::wait_for) or a successful [`poll`](Self::poll).
#[must_use = "a request whose reply is never read leaves words in the reply FIFO"]
pub struct PendingReply<'c, 'a, B: BridgeBackend, T> {
    controller: &'c mut ConfigController<'a, B>,
    words: [u32; 2],
    received: usize,
    expected: usize,
    finish: fn(&[u32]) -> T,
}

impl<B: BridgeBackend, T> std::fmt::Debug for PendingReply<'_, '_, B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("received", &self.received)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

impl<'c, 'a, B: BridgeBackend, T> PendingReply<'c, 'a, B, T> {
    fn new(controller: &'c mut ConfigController<'a, B>, expected: usize, finish: fn(&[u32]) -> T) -> Self {
        Self {
            controller,
            words: [0; 2],
            received: 0,
            expected,
            finish,
        }
    }

    /// Collect whatever reply words have arrived, without blocking
    ///
    /// Returns the value once every word is in.
    pub fn poll(&mut self) -> Option<T> {
        let Lane { pio, sm, .. } = self.controller.rx;
        while self.received < self.expected {
            let word = self.controller.backend.sm_try_get(pio, sm)?;
            self.words[self.received] = word;
            self.received += 1;
            *self.controller.owed = self.controller.owed.saturating_sub(1);
        }
        Some((self.finish)(&self.words[..self.expected]))
    }

    /// Block until the reply is complete, using the controller's timeout
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if the device does not answer.
    pub fn wait(self) -> Result<T> {
        let timeout = self.controller.reply_timeout_us;
        self.wait_for(timeout)
    }

    /// Block until the reply is complete or `timeout_us` passes
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if the device does not answer. The
    /// missing words stay owed and are dropped by the next request.
    pub fn wait_for(mut self, timeout_us: u64) -> Result<T> {
        let deadline = self.controller.backend.now_us().saturating_add(timeout_us);
        loop {
            if let Some(value) = self.poll() {
                return Ok(value);
            }
            if self.controller.backend.now_us() >= deadline {
                warn!(
                    "Reply timeout: {} of {} words after {timeout_us}us",
                    self.received, self.expected
                );
                return Err(BridgeError::Timeout {
                    duration_us: timeout_us,
                });
            }
            let ctl = &mut *self.controller;
            ctl.scheduler.tick(ctl.backend);
        }
    }
}
