//! Error types for bridge operations

use crate::controller::Mode;
use crate::lanes::LaneRole;
use sbio_chip::wire::WireError;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Hardware pool a lane or chain draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// PIO instruction memory
    ProgramMemory,
    /// PIO state machines
    StateMachine,
    /// DMA channels
    DmaChannel,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProgramMemory => write!(f, "PIO program memory"),
            Self::StateMachine => write!(f, "PIO state machine"),
            Self::DmaChannel => write!(f, "DMA channel"),
        }
    }
}

/// Errors that can occur during bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A hardware pool ran dry during bring-up
    #[error("No free {resource} for {context}")]
    ResourceExhausted {
        /// Exhausted pool
        resource: Resource,
        /// What was being allocated
        context: String,
    },

    /// A lane the operation depends on was never attached
    #[error("Lane {role} is not attached")]
    LaneMissing {
        /// Missing lane
        role: LaneRole,
    },

    /// Operation not valid in the current protocol mode
    #[error("Operation requires {expected} mode, bridge is in {actual} mode")]
    WrongMode {
        /// Mode the operation needs
        expected: Mode,
        /// Current mode
        actual: Mode,
    },

    /// Bridge is in an invalid state for the operation
    #[error("Bridge in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Bring-up failed earlier; the bridge cannot operate
    #[error("Bridge degraded: {reason}")]
    Degraded {
        /// Bring-up error message
        reason: String,
    },

    /// Deadline passed while waiting on a lane
    #[error("Operation timeout after {duration_us}us")]
    Timeout {
        /// Timeout duration in microseconds
        duration_us: u64,
    },

    /// Configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for rejection
        reason: String,
    },

    /// Transaction table has no free slot
    #[error("Transaction table full ({capacity} slots)")]
    TableFull {
        /// Slot capacity
        capacity: usize,
    },

    /// Transaction entry cannot be encoded
    #[error("Invalid transaction: {reason}")]
    InvalidTransaction {
        /// Reason for rejection
        reason: String,
    },

    /// Wire codec failure
    #[error("Wire codec error: {source}")]
    Wire {
        /// Underlying codec error
        #[from]
        source: WireError,
    },
}

impl BridgeError {
    /// Create a resource exhausted error
    pub fn exhausted(resource: Resource, context: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource,
            context: context.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a degraded error
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::Degraded {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid transaction error
    pub fn invalid_transaction(reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            reason: reason.into(),
        }
    }

    /// True for bring-up failures the bridge cannot recover from
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::LaneMissing { .. } | Self::Degraded { .. }
        )
    }
}
