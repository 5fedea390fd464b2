//! Integration tests for bridge bring-up, mode rules and run sessions
//!
//! Everything runs against the software backend, whose simulated device
//! replays the programmed table and records what it receives.

use sbio_chip::pio::PioBlock;
use sbio_chip::ring::RingIndex;
use sbio_chip::wire::{ControlHeader, PayloadTag};
use sbio_driver::{
    bridge_init, BridgeConfig, BridgeContext, BridgeError, ChainState, Direction, Health, Mode,
    Resource, RingReader, SoftwareBackend, TransactionTable,
};

fn ready_bridge(config: BridgeConfig) -> BridgeContext<SoftwareBackend> {
    let backend = SoftwareBackend::new(&config);
    bridge_init(backend, config).expect("bring-up failed")
}

/// Bring-up leaves the bridge ready, in CONFIG mode, with the chain claimed
/// but disabled
#[test]
fn test_bring_up_defaults() {
    let bridge = ready_bridge(BridgeConfig::default());
    assert_eq!(*bridge.health(), Health::Ready);
    assert_eq!(bridge.mode(), Mode::Config);
    assert!(!bridge.dma_enabled());
    assert!(bridge.lanes().is_complete());
    assert!(bridge.backend().dma_prioritized());
    assert!(!bridge.backend().device().is_running());
    assert_eq!(bridge.chain_state(Direction::Write).unwrap(), ChainState::Idle);
    assert_eq!(bridge.chain_state(Direction::Read).unwrap(), ChainState::Idle);
}

/// A single-word write burst lands in the buffer
#[test]
fn test_write_session() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    let mut table = TransactionTable::new(bridge.config());
    table.write_burst(5, &[0x1234]).unwrap();

    let report = bridge.run_session(&table, 2_000).expect("session failed");
    assert_eq!(report.slots, 3);
    assert_eq!(bridge.mode(), Mode::Config);
    assert!(!bridge.dma_enabled());
    assert_eq!(bridge.buffer().get(5), 0x1234);
    assert_eq!(bridge.buffer().get(4), 0);
    assert_eq!(bridge.buffer().get(6), 0);
    assert_eq!(bridge.backend().device().emitted(), 3);
    assert_eq!(bridge.backend().rx_overruns(), 0);
    // nothing was read, so nothing went back to the device
    assert_eq!(bridge.backend().device().ring_head(), RingIndex::ZERO);
}

/// Words injected by the device walk the write chain through its states
#[test]
fn test_injected_write_burst() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    bridge.configure_dma(true).unwrap();

    let backend = bridge.backend_mut();
    backend.inject(PayloadTag::TransferCount, PayloadTag::None, 2);
    backend.inject(PayloadTag::Address, PayloadTag::None, 5);
    assert_eq!(
        bridge.chain_state(Direction::Write).unwrap(),
        ChainState::AddressArmed { remaining: 2 }
    );

    bridge
        .backend_mut()
        .inject(PayloadTag::Data, PayloadTag::None, 0xAAAA);
    assert_eq!(
        bridge.chain_state(Direction::Write).unwrap(),
        ChainState::Transferring { remaining: 1 }
    );

    bridge
        .backend_mut()
        .inject(PayloadTag::Data, PayloadTag::None, 0xBBBB);
    assert_eq!(bridge.chain_state(Direction::Write).unwrap(), ChainState::Idle);

    assert_eq!(bridge.buffer().get(5), 0xAAAA);
    assert_eq!(bridge.buffer().get(6), 0xBBBB);
    assert_eq!(bridge.chain_state(Direction::Read).unwrap(), ChainState::Idle);
}

/// A read burst sends buffer words to the device, which stores them in its
/// ring one word time apart
#[test]
fn test_read_session() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    {
        let buffer = bridge.buffer_mut().unwrap();
        buffer.set(10, 0x0A0A);
        buffer.set(11, 0x0B0B);
        buffer.set(12, 0x0C0C);
    }
    let mut table = TransactionTable::new(bridge.config());
    table.read_burst(10, 3).unwrap();
    assert_eq!(table.expected_read_words(), 3);

    let report = bridge.run_session(&table, 2_000).unwrap();
    assert_eq!(report.rx_cursor, RingIndex::ZERO);
    assert_eq!(
        bridge.backend().device().received_since(RingIndex::ZERO),
        [0x0A0A, 0x0B0B, 0x0C0C]
    );

    let mut reader = RingReader::new();
    let entries = bridge.drain_ring(&mut reader).expect("drain failed");
    let payloads: Vec<u32> = entries.iter().map(|e| e.payload).collect();
    assert_eq!(payloads, [0x0A0A, 0x0B0B, 0x0C0C]);
    for pair in entries.windows(2) {
        let gap = pair[1].timestamp.wrapping_sub(pair[0].timestamp) & 0xFFFF;
        assert_eq!(gap, 11, "words should arrive one word time apart");
    }
    assert_eq!(reader.cursor(), RingIndex::new(3));
}

/// Two read bursts back to back, over a buffer holding its own offsets
#[test]
fn test_back_to_back_reads() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    {
        let buffer = bridge.buffer_mut().unwrap();
        for i in 0..16u16 {
            buffer.set(i, i);
        }
    }
    let mut table = TransactionTable::new(bridge.config());
    table.read_burst(1, 2).unwrap();
    table.read_burst(4, 3).unwrap();

    bridge.run_session(&table, 2_000).unwrap();
    assert_eq!(
        bridge.backend().device().received_since(RingIndex::ZERO),
        [1, 2, 4, 5, 6]
    );
}

/// Reads and writes can share one table
#[test]
fn test_mixed_session() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    bridge.buffer_mut().unwrap().set(100, 0x0777);
    let mut table = TransactionTable::new(bridge.config());
    table.write_burst(200, &[1, 2, 3]).unwrap();
    table.read_burst(100, 1).unwrap();
    table.read_burst(201, 2).unwrap();

    bridge.run_session(&table, 5_000).unwrap();
    assert_eq!(bridge.buffer().get(200), 1);
    assert_eq!(bridge.buffer().get(201), 2);
    assert_eq!(bridge.buffer().get(202), 3);

    let entries = bridge.drain_ring(&mut RingReader::new()).unwrap();
    let payloads: Vec<u32> = entries.iter().map(|e| e.payload).collect();
    assert_eq!(payloads, [0x0777, 2, 3]);
}

/// Toggling the chain without device traffic leaves the buffer alone, and
/// both directions are idempotent
#[test]
fn test_configure_dma_idempotent() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    bridge.buffer_mut().unwrap().fill(0x5A5A);

    bridge.configure_dma(true).unwrap();
    bridge.configure_dma(true).unwrap();
    assert!(bridge.dma_enabled());
    bridge.idle_for(100);
    bridge.configure_dma(false).unwrap();
    bridge.configure_dma(false).unwrap();
    assert!(!bridge.dma_enabled());

    assert!(bridge.buffer().as_slice().iter().all(|&w| w == 0x5A5A));
    assert_eq!(bridge.chain_state(Direction::Write).unwrap(), ChainState::Idle);
    assert_eq!(bridge.chain_state(Direction::Read).unwrap(), ChainState::Idle);
}

/// Leaving CONFIG mode twice is refused; returning to it is idempotent
#[test]
fn test_mode_transitions() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    bridge.enter_config().unwrap();
    assert_eq!(bridge.mode(), Mode::Config);

    bridge.enter_run().unwrap();
    assert!(bridge.backend().device().is_running());
    assert!(matches!(
        bridge.enter_run(),
        Err(BridgeError::WrongMode {
            expected: Mode::Config,
            actual: Mode::Run
        })
    ));

    bridge.enter_config().unwrap();
    bridge.enter_config().unwrap();
    assert!(!bridge.backend().device().is_running());
    assert!(!bridge.dma_enabled());
}

/// With `start_dma` the bridge comes up in RUN mode and keeps the lanes and
/// the buffer away from the CPU
#[test]
fn test_run_mode_refusals() {
    let config = BridgeConfig {
        start_dma: true,
        ..BridgeConfig::default()
    };
    let mut bridge = ready_bridge(config);
    assert_eq!(bridge.mode(), Mode::Run);
    assert!(bridge.dma_enabled());

    assert!(matches!(
        bridge.controller(),
        Err(BridgeError::WrongMode {
            expected: Mode::Config,
            actual: Mode::Run
        })
    ));
    assert!(matches!(
        bridge.buffer_mut(),
        Err(BridgeError::InvalidState { .. })
    ));
    assert!(matches!(
        bridge.poll_lane_fifos(),
        Err(BridgeError::InvalidState { .. })
    ));

    bridge.enter_config().unwrap();
    assert!(bridge.controller().is_ok());
    assert!(bridge.buffer_mut().is_ok());
}

/// An enabled chain blocks the controller even in CONFIG mode
#[test]
fn test_controller_needs_disabled_chain() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    bridge.configure_dma(true).unwrap();
    assert!(matches!(
        bridge.controller(),
        Err(BridgeError::InvalidState { .. })
    ));
    bridge.configure_dma(false).unwrap();
    assert!(bridge.controller().is_ok());
}

/// Too few DMA channels degrade the bridge; every later operation says so
#[test]
fn test_init_failure_degrades() {
    let config = BridgeConfig::default();
    let backend = SoftwareBackend::new(&config).with_dma_channels_taken(8);
    let failure = bridge_init(backend, config).expect_err("bring-up should fail");
    assert!(matches!(
        failure.error,
        BridgeError::ResourceExhausted {
            resource: Resource::DmaChannel,
            ..
        }
    ));
    assert!(failure.to_string().starts_with("PIO init failed"));

    let mut bridge = failure.into_degraded();
    assert!(matches!(bridge.health(), Health::Degraded { .. }));
    assert!(matches!(bridge.check(), Err(BridgeError::Degraded { .. })));
    assert!(matches!(bridge.controller(), Err(BridgeError::Degraded { .. })));
    assert!(matches!(bridge.enter_run(), Err(BridgeError::Degraded { .. })));
    assert!(matches!(
        bridge.configure_dma(true),
        Err(BridgeError::Degraded { .. })
    ));
    let table = TransactionTable::new(bridge.config());
    assert!(matches!(
        bridge.run_session(&table, 10),
        Err(BridgeError::Degraded { .. })
    ));
    // idling still services host I/O
    let before = bridge.backend().io_services();
    bridge.idle_for(5);
    assert!(bridge.backend().io_services() > before);
}

/// Full program memory fails bring-up too
#[test]
fn test_program_memory_exhausted() {
    let config = BridgeConfig::default();
    let backend = SoftwareBackend::new(&config).with_program_slots_taken(PioBlock::Pio1, 30);
    let failure = bridge_init(backend, config).unwrap_err();
    assert!(matches!(
        failure.error,
        BridgeError::ResourceExhausted {
            resource: Resource::ProgramMemory,
            ..
        }
    ));
}

/// A misaligned buffer base is rejected before any hardware is touched
#[test]
fn test_invalid_config_rejected() {
    let config = BridgeConfig {
        buffer_base: 0x2000_1000,
        ..BridgeConfig::default()
    };
    let backend = SoftwareBackend::new(&config);
    let failure = bridge_init(backend, config).unwrap_err();
    assert!(matches!(failure.error, BridgeError::InvalidConfig { .. }));
    let bridge = failure.into_degraded();
    assert!(!bridge.lanes().is_complete());
}

/// Pins past the last GPIO are refused by bring-up, and the degraded
/// board keeps running
#[test]
fn test_out_of_range_pins_degrade() {
    let config = BridgeConfig {
        rx_pin_base: 255,
        ..BridgeConfig::default()
    };
    let backend = SoftwareBackend::new(&config);
    let failure = bridge_init(backend, config).unwrap_err();
    assert!(matches!(failure.error, BridgeError::InvalidConfig { .. }));
    let mut bridge = failure.into_degraded();
    bridge.idle_for(100);
    assert!(matches!(bridge.controller(), Err(BridgeError::Degraded { .. })));
}

/// Programming a table writes every slot, then arms the window
#[test]
fn test_table_programming_reaches_device() {
    let mut bridge = ready_bridge(BridgeConfig::default());
    let mut table = TransactionTable::new(bridge.config());
    table.write_burst(5, &[0x1234]).unwrap();
    {
        let mut ctl = bridge.controller().unwrap();
        table.program(&mut ctl, RingIndex::ZERO).unwrap();
    }
    bridge.enter_run().unwrap();
    bridge.enter_config().unwrap();

    let device = bridge.backend().device();
    for (i, entry) in table.entries().iter().enumerate() {
        let slot = device.slot(RingIndex::new(u32::try_from(i).unwrap()));
        assert_eq!(slot.payload, entry.payload);
        assert_eq!(slot.count, entry.count);
        assert_eq!(slot.delay, entry.delay);
    }
    let headers: Vec<ControlHeader> = device.control_log().iter().map(|m| m.header).collect();
    assert_eq!(headers.len(), 3 * 5 + 4);
    assert_eq!(
        headers[15..],
        [
            ControlHeader::SetTxIndex,
            ControlHeader::SetTxStopIndex,
            ControlHeader::SetTxCountdown,
            ControlHeader::SetRxCursor,
        ]
    );
    assert_eq!(device.control_log()[16].data, 3);
}

/// The quick-start flow from the crate docs, with errors propagated by `?`
#[test]
fn test_quick_start_flow() -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::default();
    let backend = SoftwareBackend::new(&config);
    let mut bridge = bridge_init(backend, config).map_err(|failure| failure.error)?;

    let mut table = TransactionTable::new(bridge.config());
    table.write_burst(5, &[0x1234])?;
    bridge.run_session(&table, 2_000)?;
    assert_eq!(bridge.buffer().get(5), 0x1234);
    Ok(())
}
