//! # Collective Error Types
//!
//! Errors raised while validating the participants of a collective or while
//! working out who participates.

use rendezvous_core::{GlobalDeviceId, RendezvousError};
use thiserror::Error;

use crate::all_reduce::ReductionKind;

/// Errors that can occur in a collective op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectiveError {
    /// Participants disagree on how many buffers they reduce.
    #[error("participant {index} has {actual} buffers, participant 0 has {expected}")]
    BufferCountMismatch {
        /// Position of the offending participant.
        index: usize,
        /// Buffer count of the first participant.
        expected: usize,
        /// Buffer count of the offending participant.
        actual: usize,
    },

    /// A buffer's element count differs between participants, or from its data.
    #[error(
        "buffer {buffer} of participant {index} has {actual} elements, expected {expected}"
    )]
    ElementCountMismatch {
        /// Position of the offending participant.
        index: usize,
        /// Position of the buffer within the participant.
        buffer: usize,
        /// Expected element count.
        expected: usize,
        /// Actual element count.
        actual: usize,
    },

    /// Participants disagree on the reduction.
    #[error("participant {index} reduces with {actual}, participant 0 with {expected}")]
    ReductionKindMismatch {
        /// Position of the offending participant.
        index: usize,
        /// Reduction of the first participant.
        expected: ReductionKind,
        /// Reduction of the offending participant.
        actual: ReductionKind,
    },

    /// Participants disagree on the local device list.
    #[error("participant {index} lists different local devices than participant 0")]
    LocalDevicesMismatch {
        /// Position of the offending participant.
        index: usize,
    },

    /// A participant's device ordinal is missing from the local device list.
    #[error("participant {index} runs on device ordinal {device_ordinal}, which is not a listed local device")]
    DeviceNotLocal {
        /// Position of the offending participant.
        index: usize,
        /// The participant's device ordinal.
        device_ordinal: usize,
    },

    /// No replica group contains the replica.
    #[error("replica {0} is not in any replica group")]
    ReplicaNotInGroup(usize),

    /// More than one replica group contains the replica.
    #[error("replica {0} appears in more than one replica group")]
    ReplicaInMultipleGroups(usize),

    /// A replica id is outside `0..total`.
    #[error("replica {replica} out of range: only {total} replicas")]
    ReplicaOutOfRange {
        /// The replica id.
        replica: usize,
        /// Total replica count.
        total: usize,
    },

    /// The device is not part of the device assignment.
    #[error("device {0} is not in the device assignment")]
    DeviceNotAssigned(GlobalDeviceId),
}

impl From<CollectiveError> for RendezvousError {
    fn from(err: CollectiveError) -> Self {
        RendezvousError::operation_failed(err)
    }
}

/// Result type for collective operations.
pub type CollectiveResult<T> = Result<T, CollectiveError>;
