// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge context
//!
//! [`BridgeContext`] owns everything the bridge consists of: the backend,
//! the lane registry, the DMA chain, the current protocol mode and the
//! health flag. It is built by [`bridge_init`] and is the only way to reach
//! the configuration controller or the shared buffer, which lets it enforce
//! the mode rules:
//!
//! | Operation | Requires |
//! |-----------|----------|
//! | [`controller`](BridgeContext::controller) | healthy, CONFIG, chain disabled |
//! | [`buffer_mut`](BridgeContext::buffer_mut) | chain disabled |
//! | [`enter_run`](BridgeContext::enter_run) | healthy, CONFIG |
//! | [`poll_lane_fifos`](BridgeContext::poll_lane_fifos) | chain disabled |

use crate::backend::BridgeBackend;
use crate::buffer::SharedBuffer;
use crate::config::BridgeConfig;
use crate::controller::{ConfigController, Mode};
use crate::dma::{ChainState, DmaChain, Direction};
use crate::error::{BridgeError, Result};
use crate::lanes::{LaneRegistry, LaneRole};
use crate::ring::{RingEntry, RingReader};
use crate::scheduler::Scheduler;
use crate::table::TransactionTable;
use sbio_chip::program::ProgramKind;
use sbio_chip::ring::RingIndex;
use tracing::{error, info, warn};

/// Bring-up outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// All lanes and channels are set up
    Ready,
    /// Bring-up failed; every operation is refused
    Degraded {
        /// The bring-up error
        reason: String,
    },
}

/// Summary of one run session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Slots programmed
    pub slots: usize,
    /// Time spent in RUN mode (µs)
    pub window_us: u64,
    /// Ring index the session's first received word lands at
    pub rx_cursor: RingIndex,
}

/// The bridge
#[derive(Debug)]
pub struct BridgeContext<B: BridgeBackend> {
    backend: B,
    config: BridgeConfig,
    lanes: LaneRegistry,
    chain: Option<DmaChain>,
    mode: Mode,
    health: Health,
    scheduler: Scheduler,
    owed_replies: usize,
}

/// Bring-up failure, carrying the degraded context
#[derive(Debug)]
pub struct InitFailure<B: BridgeBackend> {
    /// What failed
    pub error: BridgeError,
    context: BridgeContext<B>,
}

impl<B: BridgeBackend> InitFailure<B> {
    /// The context, in degraded state
    pub fn into_degraded(self) -> BridgeContext<B> {
        self.context
    }
}

impl<B: BridgeBackend> std::fmt::Display for InitFailure<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PIO init failed: {}", self.error)
    }
}

impl<B: BridgeBackend> std::error::Error for InitFailure<B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Bring the bridge up
///
/// Validates `config`, drives the mode signal to CONFIG, attaches the six
/// lanes, seeds both address lanes, gives DMA bus priority, claims six
/// channels and programs them disabled. With `config.start_dma` the bridge
/// then enters RUN mode.
///
/// # Errors
///
/// Returns an [`InitFailure`] holding the first error and the context in
/// [`Health::Degraded`]. The failure is logged once here.
pub fn bridge_init<B: BridgeBackend>(
    backend: B,
    config: BridgeConfig,
) -> std::result::Result<BridgeContext<B>, InitFailure<B>> {
    let mut ctx = BridgeContext {
        backend,
        config,
        lanes: LaneRegistry::new(),
        chain: None,
        mode: Mode::Config,
        health: Health::Ready,
        scheduler: Scheduler::new(),
        owed_replies: 0,
    };
    match ctx.bring_up() {
        Ok(()) => {
            info!("Bridge ready on {} backend", ctx.backend.name());
            Ok(ctx)
        }
        Err(e) => {
            error!("PIO init failed: {e}");
            ctx.health = Health::Degraded {
                reason: e.to_string(),
            };
            Err(InitFailure {
                error: e,
                context: ctx,
            })
        }
    }
}

fn unclaimed() -> BridgeError {
    BridgeError::invalid_state("DMA chain not claimed")
}

impl<B: BridgeBackend> BridgeContext<B> {
    fn bring_up(&mut self) -> Result<()> {
        self.config.validate()?;
        if self.backend.buffer().base() != self.config.buffer_base {
            return Err(BridgeError::invalid_config(format!(
                "backend buffer at {:#010x}, config expects {:#010x}",
                self.backend.buffer().base(),
                self.config.buffer_base
            )));
        }
        self.backend.set_run_mode(false);
        self.lanes.attach_standard(&mut self.backend, &self.config)?;
        DmaChain::seed_address_lanes(&mut self.backend, &self.lanes, self.config.buffer_base)?;
        let mut chain = DmaChain::claim(&mut self.backend)?;
        chain.configure(&mut self.backend, &self.lanes, false)?;
        self.chain = Some(chain);
        if self.config.start_dma {
            self.enter_run()?;
        }
        Ok(())
    }

    /// Error unless bring-up succeeded
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Degraded`] after a failed bring-up.
    pub fn check(&self) -> Result<()> {
        match &self.health {
            Health::Ready => Ok(()),
            Health::Degraded { reason } => Err(BridgeError::degraded(reason.clone())),
        }
    }

    /// Bring-up outcome
    pub const fn health(&self) -> &Health {
        &self.health
    }

    /// Current protocol mode
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Active configuration
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Attached lanes
    pub const fn lanes(&self) -> &LaneRegistry {
        &self.lanes
    }

    /// The backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutable; bypasses every mode rule
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Scheduler statistics
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// True while the DMA chain owns the lanes and the buffer
    pub fn dma_enabled(&self) -> bool {
        self.chain.as_ref().is_some_and(DmaChain::is_enabled)
    }

    /// Enable or disable the DMA chain
    ///
    /// # Errors
    ///
    /// Returns error if the bridge is degraded.
    pub fn configure_dma(&mut self, enable: bool) -> Result<()> {
        self.check()?;
        let chain = self.chain.as_mut().ok_or_else(unclaimed)?;
        chain.configure(&mut self.backend, &self.lanes, enable)
    }

    /// Abort all six channels without reprogramming them
    ///
    /// # Errors
    ///
    /// Returns error if the bridge is degraded.
    pub fn stop_dma(&mut self) -> Result<()> {
        self.check()?;
        let chain = self.chain.as_mut().ok_or_else(unclaimed)?;
        chain.stop(&mut self.backend);
        Ok(())
    }

    /// Transfer state of one direction's data channel
    ///
    /// # Errors
    ///
    /// Returns error if the bridge is degraded.
    pub fn chain_state(&self, direction: Direction) -> Result<ChainState> {
        self.check()?;
        self.chain
            .as_ref()
            .map(|chain| chain.state(&self.backend, direction))
            .ok_or_else(unclaimed)
    }

    /// Let queued control messages go out, enable the chain, then raise the
    /// mode signal
    ///
    /// Late replies to timed-out requests are collected first so the write
    /// chain never stores them.
    ///
    /// # Errors
    ///
    /// Returns error if degraded, already in RUN mode, or if owed replies
    /// never arrive.
    pub fn enter_run(&mut self) -> Result<()> {
        self.check()?;
        if self.mode == Mode::Run {
            return Err(BridgeError::WrongMode {
                expected: Mode::Config,
                actual: Mode::Run,
            });
        }
        self.flush_read_data_lane("entering RUN mode")?;
        if self.owed_replies > 0 {
            self.controller()?.settle_owed_replies()?;
        }
        self.configure_dma(true)?;
        self.backend.set_run_mode(true);
        self.mode = Mode::Run;
        info!("Entered RUN mode");
        Ok(())
    }

    /// Disable the chain, let the read-data FIFO drain, then drop the mode
    /// signal
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the bridge is degraded.
    pub fn enter_config(&mut self) -> Result<()> {
        self.check()?;
        self.configure_dma(false)?;
        if self.mode == Mode::Run {
            self.flush_read_data_lane("leaving RUN mode")?;
        }
        self.backend.set_run_mode(false);
        self.mode = Mode::Config;
        Ok(())
    }

    /// Wait until the device has taken every word queued on the read-data
    /// lane; words left behind would be read in the wrong mode
    fn flush_read_data_lane(&mut self, when: &str) -> Result<()> {
        let tx = self.lanes.lane(LaneRole::ReadData)?;
        let flushed = self.scheduler.block_on(
            &mut self.backend,
            self.config.reply_timeout_us,
            |b| b.sm_tx_is_empty(tx.pio, tx.sm).then_some(()),
        );
        if flushed.is_err() {
            warn!("Read-data FIFO still holds words when {when}");
        }
        Ok(())
    }

    /// Controller for CONFIG-mode traffic
    ///
    /// # Errors
    ///
    /// Returns error if degraded, in RUN mode, or with the chain enabled.
    pub fn controller(&mut self) -> Result<ConfigController<'_, B>> {
        self.check()?;
        if self.mode != Mode::Config {
            return Err(BridgeError::WrongMode {
                expected: Mode::Config,
                actual: self.mode,
            });
        }
        if self.dma_enabled() {
            return Err(BridgeError::invalid_state(
                "DMA chain owns the lanes; disable it first",
            ));
        }
        ConfigController::new(
            &mut self.backend,
            &mut self.scheduler,
            &self.lanes,
            &mut self.owed_replies,
            self.config.reply_timeout_us,
        )
    }

    /// Shared buffer, read-only; contents may be changing while DMA runs
    pub fn buffer(&self) -> &SharedBuffer {
        self.backend.buffer()
    }

    /// Shared buffer for CPU writes
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] while the chain is enabled.
    pub fn buffer_mut(&mut self) -> Result<&mut SharedBuffer> {
        if self.dma_enabled() {
            return Err(BridgeError::invalid_state(
                "shared buffer is owned by DMA while the chain is enabled",
            ));
        }
        Ok(self.backend.buffer_mut())
    }

    /// Program `table`, run it for `window_us`, and return to CONFIG mode
    ///
    /// The receive ring is reset to index 0, so a [`RingReader::new`]
    /// reader sees exactly the words of this session.
    ///
    /// # Errors
    ///
    /// Returns error if programming fails or the mode switch is refused.
    pub fn run_session(&mut self, table: &TransactionTable, window_us: u64) -> Result<SessionReport> {
        let rx_cursor = RingIndex::ZERO;
        {
            let mut ctl = self.controller()?;
            table.program(&mut ctl, rx_cursor)?;
        }
        self.enter_run()?;
        self.scheduler.idle_for(&mut self.backend, window_us);
        self.enter_config()?;
        info!("Session: {} slots over {window_us}us", table.len());
        Ok(SessionReport {
            slots: table.len(),
            window_us,
            rx_cursor,
        })
    }

    /// Drain every new ring entry into a vector
    ///
    /// # Errors
    ///
    /// Returns the first request failure; entries before it are consumed.
    pub fn drain_ring(&mut self, reader: &mut RingReader) -> Result<Vec<RingEntry>> {
        let mut ctl = self.controller()?;
        let drain = reader.drain_new_entries(&mut ctl)?;
        drain.collect()
    }

    /// Service host I/O for `duration_us` without touching the lanes
    pub fn idle_for(&mut self, duration_us: u64) {
        self.scheduler.idle_for(&mut self.backend, duration_us);
    }

    /// Pop and log whatever sits in the receive lanes' RX FIFOs
    ///
    /// Diagnostic for bring-up on a new board: shows which lanes see traffic.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] while the chain is enabled.
    pub fn poll_lane_fifos(&mut self) -> Result<Vec<(LaneRole, u32)>> {
        if self.dma_enabled() {
            return Err(BridgeError::invalid_state(
                "lane FIFOs are owned by DMA while the chain is enabled",
            ));
        }
        let mut seen = Vec::new();
        for lane in self.lanes.iter() {
            if lane.program.kind == ProgramKind::Transmit {
                continue;
            }
            while let Some(word) = self.backend.sm_try_get(lane.pio, lane.sm) {
                info!("{}: {word:#x}", lane.role);
                seen.push((lane.role, word));
            }
        }
        Ok(seen)
    }
}
