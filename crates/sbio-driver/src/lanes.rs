//! Lane registry
//!
//! A lane is one PIO state machine running one serial program. The bridge
//! uses six of them, split over both PIO blocks:
//!
//! ```text
//! pio0: read-data (tx)  write-data (rx 10)  write-count (rx 00)  read-count (clone)
//! pio1: write-addr (rx addr 01)             read-addr (clone)
//! ```
//!
//! A clone shares the instruction offset of an already loaded program and
//! only claims a new state machine, so the source lane must be attached
//! first.

use crate::backend::BridgeBackend;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Resource, Result};
use sbio_chip::pio::PioBlock;
use sbio_chip::program::{self, LanePins, SerialProgram};
use tracing::{debug, error};

/// Role of a lane in the bridge topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneRole {
    /// Device → host data words, stored into the buffer
    WriteData,
    /// Device → host write addresses
    WriteAddress,
    /// Device → host write burst lengths
    WriteCount,
    /// Host → device: read data in run mode, control messages in config mode
    ReadData,
    /// Device → host read addresses
    ReadAddress,
    /// Device → host read burst lengths
    ReadCount,
}

impl LaneRole {
    /// All roles in bring-up order
    pub const ALL: [Self; 6] = [
        Self::ReadData,
        Self::WriteData,
        Self::WriteCount,
        Self::ReadCount,
        Self::WriteAddress,
        Self::ReadAddress,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::WriteData => 0,
            Self::WriteAddress => 1,
            Self::WriteCount => 2,
            Self::ReadData => 3,
            Self::ReadAddress => 4,
            Self::ReadCount => 5,
        }
    }
}

impl std::fmt::Display for LaneRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::WriteData => "write-data",
            Self::WriteAddress => "write-addr",
            Self::WriteCount => "write-count",
            Self::ReadData => "read-data",
            Self::ReadAddress => "read-addr",
            Self::ReadCount => "read-count",
        };
        f.pad(name)
    }
}

/// An attached lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lane {
    /// Role
    pub role: LaneRole,
    /// PIO block
    pub pio: PioBlock,
    /// State machine index
    pub sm: u8,
    /// Program instruction offset
    pub offset: u8,
    /// Program image
    pub program: SerialProgram,
    /// Pin assignment
    pub pins: LanePins,
}

impl Lane {
    /// RX FIFO register address
    pub const fn rx_register(&self) -> u32 {
        self.pio.rxf(self.sm)
    }

    /// TX FIFO register address
    pub const fn tx_register(&self) -> u32 {
        self.pio.txf(self.sm)
    }

    /// DREQ raised while the RX FIFO holds data
    pub const fn rx_dreq(&self) -> u8 {
        self.pio.dreq(self.sm, false)
    }

    /// DREQ raised while the TX FIFO has room
    pub const fn tx_dreq(&self) -> u8 {
        self.pio.dreq(self.sm, true)
    }
}

/// The six bridge lanes, each attached at most once
#[derive(Debug, Clone, Default)]
pub struct LaneRegistry {
    lanes: [Option<Lane>; 6],
}

impl LaneRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `program` into `pio`, claim a state machine and start it
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ResourceExhausted`] if the program does not fit
    /// or no state machine is free, and [`BridgeError::InvalidState`] if the
    /// role is already attached.
    pub fn attach<B: BridgeBackend>(
        &mut self,
        backend: &mut B,
        role: LaneRole,
        pio: PioBlock,
        program: SerialProgram,
        pins: LanePins,
    ) -> Result<Lane> {
        self.ensure_vacant(role)?;
        if !backend.can_add_program(pio, &program) {
            return Err(BridgeError::exhausted(
                Resource::ProgramMemory,
                format!("{} ({role}) on {pio}", program.name),
            ));
        }
        let offset = backend.add_program(pio, &program);
        self.start(backend, role, pio, offset, program, pins)
    }

    /// Attach `role` running the program already loaded for `source`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LaneMissing`] if `source` is not attached and
    /// [`BridgeError::ResourceExhausted`] if no state machine is free on the
    /// source's block.
    pub fn clone_attach<B: BridgeBackend>(
        &mut self,
        backend: &mut B,
        role: LaneRole,
        source: LaneRole,
        pins: LanePins,
    ) -> Result<Lane> {
        self.ensure_vacant(role)?;
        let src = self.lane(source)?;
        self.start(backend, role, src.pio, src.offset, src.program, pins)
    }

    /// Attach all six lanes in bring-up order
    ///
    /// A failing lane does not stop the remaining ones from being tried;
    /// every failure is logged.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn attach_standard<B: BridgeBackend>(
        &mut self,
        backend: &mut B,
        config: &BridgeConfig,
    ) -> Result<()> {
        let rx = config.rx_pin_base;
        let mut first_error = None;
        let mut record = |role: LaneRole, result: Result<Lane>| {
            if let Err(e) = result {
                error!("Lane {role} failed to attach: {e}");
                first_error.get_or_insert(e);
            }
        };

        let r = self.attach(
            backend,
            LaneRole::ReadData,
            PioBlock::Pio0,
            program::SBIO2_TX,
            LanePins::transmit(config.tx_pin_base),
        );
        record(LaneRole::ReadData, r);
        let r = self.attach(
            backend,
            LaneRole::WriteData,
            PioBlock::Pio0,
            program::SBIO2_RX_10,
            LanePins::receive(rx, 0),
        );
        record(LaneRole::WriteData, r);
        let r = self.attach(
            backend,
            LaneRole::WriteCount,
            PioBlock::Pio0,
            program::SBIO2_RX_00,
            LanePins::receive(rx, 0),
        );
        record(LaneRole::WriteCount, r);
        let r = self.clone_attach(
            backend,
            LaneRole::ReadCount,
            LaneRole::WriteCount,
            LanePins::receive(rx, 1),
        );
        record(LaneRole::ReadCount, r);
        let r = self.attach(
            backend,
            LaneRole::WriteAddress,
            PioBlock::Pio1,
            program::SBIO2_RX_ADDR_01,
            LanePins::receive(rx, 0),
        );
        record(LaneRole::WriteAddress, r);
        let r = self.clone_attach(
            backend,
            LaneRole::ReadAddress,
            LaneRole::WriteAddress,
            LanePins::receive(rx, 1),
        );
        record(LaneRole::ReadAddress, r);

        first_error.map_or(Ok(()), Err)
    }

    /// Lane for `role`, if attached
    pub fn get(&self, role: LaneRole) -> Option<&Lane> {
        self.lanes[role.slot()].as_ref()
    }

    /// Lane for `role`
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LaneMissing`] if it was never attached.
    pub fn lane(&self, role: LaneRole) -> Result<Lane> {
        self.get(role).copied().ok_or(BridgeError::LaneMissing { role })
    }

    /// True once all six lanes are attached
    pub fn is_complete(&self) -> bool {
        self.lanes.iter().all(Option::is_some)
    }

    /// Attached lanes in bring-up order
    pub fn iter(&self) -> impl Iterator<Item = &Lane> {
        LaneRole::ALL.into_iter().filter_map(|role| self.get(role))
    }

    fn ensure_vacant(&self, role: LaneRole) -> Result<()> {
        if self.get(role).is_some() {
            return Err(BridgeError::invalid_state(format!("lane {role} already attached")));
        }
        Ok(())
    }

    fn start<B: BridgeBackend>(
        &mut self,
        backend: &mut B,
        role: LaneRole,
        pio: PioBlock,
        offset: u8,
        program: SerialProgram,
        pins: LanePins,
    ) -> Result<Lane> {
        let sm = backend.claim_unused_sm(pio).ok_or_else(|| {
            BridgeError::exhausted(Resource::StateMachine, format!("{role} on {pio}"))
        })?;
        backend.init_state_machine(pio, sm, offset, &program, pins);
        let lane = Lane {
            role,
            pio,
            sm,
            offset,
            program,
            pins,
        };
        debug!(
            "Lane {role}: {} on {pio} sm{sm} offset {offset} pin {}",
            program.name, pins.header_pin
        );
        self.lanes[role.slot()] = Some(lane);
        Ok(lane)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SoftwareBackend;

    #[test]
    fn role_names_pad_to_width() {
        assert_eq!(format!("{:<12}|", LaneRole::ReadData), "read-data   |");
        assert_eq!(format!("{:^7}", crate::controller::Mode::Run), "  RUN  ");
    }

    #[test]
    fn standard_topology() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut lanes = LaneRegistry::new();
        lanes
            .attach_standard(&mut backend, &BridgeConfig::default())
            .unwrap();
        assert!(lanes.is_complete());

        let wcount = lanes.lane(LaneRole::WriteCount).unwrap();
        let rcount = lanes.lane(LaneRole::ReadCount).unwrap();
        assert_eq!(rcount.pio, PioBlock::Pio0);
        assert_eq!(rcount.offset, wcount.offset);
        assert_eq!(rcount.pins.header_pin, wcount.pins.header_pin + 1);

        let waddr = lanes.lane(LaneRole::WriteAddress).unwrap();
        let raddr = lanes.lane(LaneRole::ReadAddress).unwrap();
        assert_eq!((waddr.pio, raddr.pio), (PioBlock::Pio1, PioBlock::Pio1));
        assert_eq!(raddr.offset, waddr.offset);

        let roles: Vec<LaneRole> = lanes.iter().map(|l| l.role).collect();
        assert_eq!(roles, LaneRole::ALL);
    }

    #[test]
    fn clone_needs_source() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut lanes = LaneRegistry::new();
        let err = lanes
            .clone_attach(
                &mut backend,
                LaneRole::ReadCount,
                LaneRole::WriteCount,
                LanePins::receive(0, 1),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::LaneMissing {
                role: LaneRole::WriteCount
            }
        ));
    }

    #[test]
    fn role_attaches_once() {
        let mut backend = SoftwareBackend::with_defaults();
        let mut lanes = LaneRegistry::new();
        let pins = LanePins::transmit(4);
        lanes
            .attach(&mut backend, LaneRole::ReadData, PioBlock::Pio0, program::SBIO2_TX, pins)
            .unwrap();
        let again =
            lanes.attach(&mut backend, LaneRole::ReadData, PioBlock::Pio0, program::SBIO2_TX, pins);
        assert!(matches!(again, Err(BridgeError::InvalidState { .. })));
    }

    #[test]
    fn full_program_memory_keeps_other_lanes() {
        let mut backend = SoftwareBackend::with_defaults().with_program_slots_taken(PioBlock::Pio0, 10);
        let mut lanes = LaneRegistry::new();
        let err = lanes
            .attach_standard(&mut backend, &BridgeConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ResourceExhausted {
                resource: Resource::ProgramMemory,
                ..
            }
        ));
        assert!(lanes.get(LaneRole::WriteCount).is_none());
        assert!(lanes.get(LaneRole::ReadCount).is_none());
        assert!(lanes.get(LaneRole::WriteAddress).is_some());
        assert!(lanes.get(LaneRole::ReadAddress).is_some());
        assert!(!lanes.is_complete());
    }
}
