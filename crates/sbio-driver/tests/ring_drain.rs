//! Integration tests for the configuration controller and the ring reader

use sbio_chip::ring::RingIndex;
use sbio_chip::wire::{ControlHeader, ControlMessage};
use sbio_driver::backends::software::RingRecord;
use sbio_driver::{
    bridge_init, BridgeConfig, BridgeContext, BridgeError, RingReader, SoftwareBackend,
};

fn bridge() -> BridgeContext<SoftwareBackend> {
    let config = BridgeConfig::default();
    let backend = SoftwareBackend::new(&config);
    bridge_init(backend, config).expect("bring-up failed")
}

fn fill_ring(bridge: &mut BridgeContext<SoftwareBackend>, count: u32) {
    let device = bridge.backend_mut().device_mut();
    for i in 0..count {
        device.push_ring(RingRecord {
            payload: 0x100 + i,
            timestamp: 1_000 + 11 * i,
        });
    }
    device.clear_control_log();
}

/// The reader asks for the head once, then one payload/timestamp pair per
/// entry from its cursor up to the head
#[test]
fn test_drain_from_cursor() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 7);

    let mut reader = RingReader::starting_at(RingIndex::new(3));
    let entries = bridge.drain_ring(&mut reader).expect("drain failed");

    let indices: Vec<u16> = entries.iter().map(|e| e.index.value()).collect();
    assert_eq!(indices, [3, 4, 5, 6]);
    assert_eq!(entries[0].payload, 0x103);
    assert_eq!(entries[0].timestamp, 1_033);
    assert_eq!(entries[3].payload, 0x106);
    assert_eq!(reader.cursor(), RingIndex::new(7));

    let mut expected = vec![ControlMessage::new(ControlHeader::ReadRxHead, 0)];
    for i in 3..7 {
        expected.push(ControlMessage::new(ControlHeader::ReadRxPayload, i));
        expected.push(ControlMessage::new(ControlHeader::ReadRxTimestamp, i));
    }
    assert_eq!(bridge.backend().device().control_log(), expected);
}

/// Draining again with nothing new costs one head request and yields nothing
#[test]
fn test_drain_idempotent() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 2);

    let mut reader = RingReader::new();
    assert_eq!(bridge.drain_ring(&mut reader).unwrap().len(), 2);
    bridge.backend_mut().device_mut().clear_control_log();

    assert!(bridge.drain_ring(&mut reader).unwrap().is_empty());
    assert_eq!(reader.cursor(), RingIndex::new(2));
    let log = bridge.backend().device().control_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].header, ControlHeader::ReadRxHead);
}

/// Indices wrap from 1023 to 0
#[test]
fn test_drain_across_wrap() {
    let mut bridge = bridge();
    bridge
        .backend_mut()
        .device_mut()
        .set_ring_head(RingIndex::new(1022));
    fill_ring(&mut bridge, 3);

    let mut reader = RingReader::starting_at(RingIndex::new(1022));
    let entries = bridge.drain_ring(&mut reader).unwrap();
    let indices: Vec<u16> = entries.iter().map(|e| e.index.value()).collect();
    assert_eq!(indices, [1022, 1023, 0]);
    assert_eq!(entries[2].payload, 0x102);
    assert_eq!(reader.cursor(), RingIndex::new(1));
}

/// A drain abandoned half-way resumes where it stopped
#[test]
fn test_partial_drain_resumes() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 6);
    let mut reader = RingReader::new();

    {
        let mut ctl = bridge.controller().unwrap();
        let mut drain = reader.drain_new_entries(&mut ctl).unwrap();
        assert_eq!(drain.head(), RingIndex::new(6));
        assert_eq!(drain.remaining(), 6);
        let first: Vec<_> = drain.by_ref().take(2).collect::<Result<_, _>>().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(drain.remaining(), 4);
    }
    assert_eq!(reader.cursor(), RingIndex::new(2));

    let rest = bridge.drain_ring(&mut reader).unwrap();
    let payloads: Vec<u32> = rest.iter().map(|e| e.payload).collect();
    assert_eq!(payloads, [0x102, 0x103, 0x104, 0x105]);
}

/// An unanswered request times out; its late reply is discarded by the
/// next controller user
#[test]
fn test_reply_timeout_and_stale_reply() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 1);

    {
        let mut ctl = bridge.controller().unwrap();
        let err = ctl.request_ring_head().unwrap().wait_for(0).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { duration_us: 0 }));
    }
    bridge.idle_for(20);

    let mut ctl = bridge.controller().unwrap();
    assert_eq!(ctl.owed_replies(), 1);
    assert_eq!(ctl.discard_stale_replies(), 1);
    assert_eq!(ctl.owed_replies(), 0);
    let head = ctl.request_ring_head().unwrap().wait().unwrap();
    assert_eq!(head, RingIndex::new(1));
}

/// A reply still in flight when its request timed out is not mistaken for
/// the answer to the next request
#[test]
fn test_entry_after_head_timeout() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 2);

    let mut ctl = bridge.controller().unwrap();
    let err = ctl.request_ring_head().unwrap().wait_for(0).unwrap_err();
    assert!(matches!(err, BridgeError::Timeout { .. }));
    assert_eq!(ctl.owed_replies(), 1);

    let reply = ctl.request_ring_entry(RingIndex::ZERO).unwrap().wait().unwrap();
    assert_eq!(reply.payload, 0x100);
    assert_eq!(reply.timestamp, 1_000);
    assert_eq!(ctl.owed_replies(), 0);
}

/// The owed count outlives the controller that timed out, so a fresh drain
/// after an abandoned one still reads the right entries
#[test]
fn test_drain_after_abandoned_entry_request() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 3);

    {
        let mut ctl = bridge.controller().unwrap();
        let pending = ctl.request_ring_entry(RingIndex::new(2)).unwrap();
        assert!(pending.wait_for(0).is_err());
    }

    let entries = bridge.drain_ring(&mut RingReader::new()).unwrap();
    let payloads: Vec<u32> = entries.iter().map(|e| e.payload).collect();
    assert_eq!(payloads, [0x100, 0x101, 0x102]);
    assert_eq!(entries[1].timestamp, 1_011);
}

/// Nothing arrives without a request
#[test]
fn test_receive_without_request_times_out() {
    let mut bridge = bridge();
    let mut ctl = bridge.controller().unwrap();
    assert!(matches!(
        ctl.receive_raw(50),
        Err(BridgeError::Timeout { duration_us: 50 })
    ));
}

/// A reply can be collected without blocking
#[test]
fn test_poll_entry_reply() {
    let mut bridge = bridge();
    fill_ring(&mut bridge, 1);
    let mut ctl = bridge.controller().unwrap();
    let mut pending = ctl.request_ring_entry(RingIndex::ZERO).unwrap();
    assert!(pending.poll().is_none());
    let reply = pending.wait().unwrap();
    assert_eq!(reply.payload, 0x100);
    assert_eq!(reply.timestamp, 1_000);
}

/// Values wider than a control message are refused before anything is sent
#[test]
fn test_oversized_control_values() {
    let mut bridge = bridge();
    bridge.backend_mut().device_mut().clear_control_log();
    {
        let mut ctl = bridge.controller().unwrap();
        assert!(matches!(
            ctl.send(ControlMessage::new(ControlHeader::SetTxCountdown, 0x1000)),
            Err(BridgeError::Wire { .. })
        ));
        assert!(matches!(
            ctl.program_transaction(RingIndex::ZERO, 0x0100_0000, 10, 1),
            Err(BridgeError::Wire { .. })
        ));
    }
    bridge.idle_for(10);
    assert!(bridge.backend().device().control_log().is_empty());
}
