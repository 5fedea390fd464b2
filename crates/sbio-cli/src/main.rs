// SPDX-License-Identifier: AGPL-3.0-only

//! `sbio` — command-line driver for the serial RAM bridge.
//!
//! Runs the bridge against the simulated board and peer device.
//!
//! ```text
//! USAGE:
//!   sbio info                 Bring the bridge up and print its topology
//!   sbio write-burst          Write bursts of growing length, read them back
//!   sbio read-sweep           511 two-word reads, payload and timing check
//!   sbio loopback <words>     Write words, read them back through the ring
//! ```
//!
//! Configuration comes from `SBIO_*` environment variables; flags override
//! them.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sbio_chip::program::PINS;
use sbio_chip::ring::RingIndex;
use sbio_driver::prelude::*;
use sbio_driver::{Health, LaneRole, RingEntry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Reports printed while holding a failed bridge
const FAILURE_REPORTS: u32 = 5;

/// Time between failure reports (µs)
const FAILURE_REPORT_INTERVAL_US: u64 = 10_000;

/// Errors after which the read sweep stops checking
const MAX_SWEEP_ERRORS: usize = 10;

#[derive(Parser)]
#[command(name = "sbio", about = "Serial RAM bridge CLI", version)]
struct Cli {
    #[command(flatten)]
    board: BoardArgs,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct BoardArgs {
    /// First device → host pin
    #[arg(long, global = true)]
    rx_pin_base: Option<u8>,

    /// First host → device pin
    #[arg(long, global = true)]
    tx_pin_base: Option<u8>,

    /// Shared buffer base address (hex, 128 KB aligned)
    #[arg(long, global = true, value_parser = parse_hex)]
    buffer_base: Option<u32>,

    /// Time spent in RUN mode per session (µs)
    #[arg(long, global = true)]
    window_us: Option<u64>,

    /// DMA channels held by other firmware on the simulated board
    #[arg(long, global = true, default_value_t = 0)]
    busy_dma_channels: usize,
}

#[derive(Subcommand)]
enum Cmd {
    /// Bring the bridge up and print lanes, channels and configuration.
    Info,
    /// Write bursts of one and two words, then read six words back.
    WriteBurst,
    /// Read two words at each of 511 addresses and verify the ring.
    ReadSweep {
        /// Words per read
        #[arg(long, default_value_t = 2)]
        rcount: u16,
        /// Delay after every read address (cycles)
        #[arg(long, default_value_t = 12)]
        read_delay: u32,
    },
    /// Write words at an offset, read them back and compare.
    Loopback {
        /// Words to send (hex)
        #[arg(required = true, value_parser = parse_hex_word)]
        words: Vec<u16>,
        /// Buffer offset
        #[arg(long, default_value_t = 0x100)]
        offset: u16,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = cli.board.apply(BridgeConfig::from_env()?)?;

    let Some(mut bridge) = bring_up(config, cli.board.busy_dma_channels) else {
        bail!("bridge bring-up failed");
    };

    match cli.command {
        Cmd::Info => cmd_info(&bridge),
        Cmd::WriteBurst => cmd_write_burst(&mut bridge),
        Cmd::ReadSweep { rcount, read_delay } => cmd_read_sweep(&mut bridge, rcount, read_delay),
        Cmd::Loopback { words, offset } => cmd_loopback(&mut bridge, offset, &words),
    }
}

impl BoardArgs {
    fn apply(&self, mut config: BridgeConfig) -> Result<BridgeConfig> {
        if let Some(pin) = self.rx_pin_base {
            config.rx_pin_base = pin;
        }
        if let Some(pin) = self.tx_pin_base {
            config.tx_pin_base = pin;
        }
        if let Some(base) = self.buffer_base {
            config.buffer_base = base;
        }
        if let Some(us) = self.window_us {
            config = config.with_run_window_us(us);
        }
        config.validate().context("invalid bridge configuration")?;
        Ok(config)
    }
}

fn parse_hex(s: &str) -> Result<u32, std::num::ParseIntError> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
}

fn parse_hex_word(s: &str) -> Result<u16, std::num::ParseIntError> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
}

/// Bring the bridge up, or keep the failed board serviced for a while and
/// report the failure
fn bring_up(config: BridgeConfig, busy_dma_channels: usize) -> Option<BridgeContext<SoftwareBackend>> {
    let backend = SoftwareBackend::new(&config).with_dma_channels_taken(busy_dma_channels);
    match bridge_init(backend, config) {
        Ok(bridge) => Some(bridge),
        Err(failure) => {
            let reason = failure.error.to_string();
            let mut bridge = failure.into_degraded();
            for _ in 0..FAILURE_REPORTS {
                bridge.idle_for(FAILURE_REPORT_INTERVAL_US);
                println!("PIO init failed! ({reason})");
            }
            None
        }
    }
}

fn cmd_info(bridge: &BridgeContext<SoftwareBackend>) -> Result<()> {
    let cfg = bridge.config();
    let health = match bridge.health() {
        Health::Ready => "ready".to_string(),
        Health::Degraded { reason } => format!("degraded ({reason})"),
    };

    println!("Backend      : {}", bridge.backend().name());
    println!("Health       : {health}");
    println!("Mode         : {}", bridge.mode());
    println!("Buffer       : {:#010x} (64 Ki × 16 bit)", cfg.buffer_base);
    println!(
        "Pins         : rx {}..{}  tx {}..{}",
        cfg.rx_pin_base,
        cfg.rx_pin_base.saturating_add(PINS),
        cfg.tx_pin_base,
        cfg.tx_pin_base.saturating_add(PINS)
    );
    println!(
        "Slot timing  : count {}  delay {}  first read +{}  read +{}",
        cfg.slot_count, cfg.slot_delay, cfg.first_read_extra_delay, cfg.read_extra_delay
    );
    println!("Run window   : {} µs", cfg.run_window_us);
    println!();

    println!("Lanes:");
    for lane in bridge.lanes().iter() {
        println!(
            "  {:<12} {} sm{}  {:<17} offset {:>2}  header pin {}",
            lane.role,
            lane.pio,
            lane.sm,
            lane.program.name,
            lane.offset,
            lane.pins.header_pin
        );
    }
    println!();

    println!("DMA:");
    for direction in [Direction::Write, Direction::Read] {
        println!("  {direction:<6} {:?}", bridge.chain_state(direction)?);
    }
    Ok(())
}

fn cmd_write_burst(bridge: &mut BridgeContext<SoftwareBackend>) -> Result<()> {
    let window = bridge.config().run_window_us;
    let mut table = TransactionTable::new(bridge.config());
    for i in 0..2u16 {
        let words: Vec<u16> = (0..=i).map(|j| 0x1234 + (i * 2 + j) * 0x1111).collect();
        table.write_burst(i * 4 + 1, &words)?;
    }
    table.read_burst(1, 6)?;

    let report = bridge.run_session(&table, window)?;
    info!("{report:?}");

    println!("RAM after writes:");
    for i in 0..10 {
        println!("  ram[{i}] = {:#06x}", bridge.buffer().get(i));
    }

    let entries = bridge.drain_ring(&mut RingReader::new())?;
    println!("Read back:");
    print_entries(&entries);
    Ok(())
}

fn cmd_read_sweep(bridge: &mut BridgeContext<SoftwareBackend>, rcount: u16, read_delay: u32) -> Result<()> {
    if rcount == 0 {
        bail!("rcount must be at least 1");
    }
    let window = bridge.config().run_window_us;
    for (i, cell) in bridge.buffer_mut()?.as_mut_slice().iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let value = i as u16;
        *cell = value;
    }

    let mut config = bridge.config().clone();
    config.first_read_extra_delay = read_delay;
    config.read_extra_delay = read_delay;
    let mut table = TransactionTable::new(&config);
    let num_reads = TransactionTable::CAPACITY / 2;
    table.read_count(rcount)?;
    for i in 0..num_reads {
        let addr = u16::try_from(i * (usize::from(rcount) + 1)).context("read address overflow")?;
        table.read_address(addr)?;
    }
    let expected = table.expected_read_words();

    bridge.run_session(&table, window)?;

    let mut reader = RingReader::new();
    let mut errors = 0usize;
    {
        let mut ctl = bridge.controller()?;
        let drain = reader.drain_new_entries(&mut ctl)?;
        let head = usize::from(drain.head().value());
        println!("rx_index = {head}");
        if head != expected % usize::from(sbio_chip::ring::RING_SLOTS) {
            errors += 1;
            println!("Expected rx_index = {expected} instead! ****");
        }

        let mut first_timestamp = None;
        let mut prev_timestamp = 0u32;
        let mut min_delay = u32::MAX;
        let mut max_delay = 0u32;
        for (n, entry) in drain.enumerate() {
            let entry = entry?;
            let (j, i) = (n / usize::from(rcount), n % usize::from(rcount));
            let expected_payload = j * (usize::from(rcount) + 1) + i;
            if usize::try_from(entry.payload).ok() != Some(expected_payload) {
                errors += 1;
                println!("({j}, {i}): Expected payload = {expected_payload}, got {}! ****", entry.payload);
            }
            if first_timestamp.is_none() {
                first_timestamp = Some(entry.timestamp);
            } else {
                let delay = entry.timestamp.wrapping_sub(prev_timestamp) & 0xFFFF;
                min_delay = min_delay.min(delay);
                max_delay = max_delay.max(delay);
            }
            prev_timestamp = entry.timestamp;
            if errors >= MAX_SWEEP_ERRORS {
                break;
            }
        }
        println!(
            "First timestamp = {}, {min_delay} <= delay <= {max_delay}",
            first_timestamp.unwrap_or_default()
        );
    }

    if errors > 0 {
        warn!("Read sweep: {errors} errors, ring cursor at {}", reader.cursor());
        bail!("{errors} errors found");
    }
    println!("Read sweep OK: {expected} words");
    Ok(())
}

fn cmd_loopback(bridge: &mut BridgeContext<SoftwareBackend>, offset: u16, words: &[u16]) -> Result<()> {
    let window = bridge.config().run_window_us;
    let len = u16::try_from(words.len()).context("too many words")?;
    let mut table = TransactionTable::new(bridge.config());
    table.write_burst(offset, words)?;
    table.read_burst(offset, len)?;

    bridge.run_session(&table, window)?;
    let entries = bridge.drain_ring(&mut RingReader::starting_at(RingIndex::ZERO))?;
    print_entries(&entries);

    let echoed: Vec<u32> = entries.iter().map(|e| e.payload).collect();
    let sent: Vec<u32> = words.iter().copied().map(u32::from).collect();
    if echoed != sent {
        bail!("loopback mismatch: sent {sent:x?}, got {echoed:x?}");
    }
    println!("Loopback OK: {} words via {}", words.len(), LaneRole::ReadData);
    Ok(())
}

fn print_entries(entries: &[RingEntry]) {
    for e in entries {
        println!("  [{:>4}] {:#06x}  t={}", e.index, e.payload, e.timestamp);
    }
}
