//! # Rendezvous Error Types
//!
//! All recoverable errors a participant can observe from a rendezvous.
//!
//! Reusing a rendezvous after it started executing is not listed here: it is a
//! defect in the caller and panics.

use thiserror::Error;

/// Errors that can occur while joining a rendezvous.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendezvousError {
    /// A participant disagreed with the participants already recorded.
    ///
    /// Only the mismatching caller sees this error.
    #[error(
        "mismatch among rendezvous participants: expected the same rendezvous key, \
         but recorded participant is {recorded} and submitted participant is {submitted}"
    )]
    IdentityMismatch {
        /// Description of the participant that was already recorded.
        recorded: String,
        /// Description of the participant that was rejected.
        submitted: String,
    },

    /// The collective operation hook failed.
    ///
    /// Every participant of the rendezvous sees the same error.
    #[error("collective operation failed for {key}: {reason}")]
    OperationFailed {
        /// The rendezvous key, formatted for diagnostics.
        key: String,
        /// What went wrong.
        reason: String,
    },

    /// The collective operation returned fewer outputs than participants.
    #[error("collective operation for {key} produced no output for participant {index}")]
    MissingOutput {
        /// The rendezvous key, formatted for diagnostics.
        key: String,
        /// Position of the participant in submission order.
        index: usize,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RendezvousError {
    /// Builds an [`RendezvousError::OperationFailed`] from any displayable reason.
    ///
    /// The key is filled in by the rendezvous when the error is published, so
    /// collective implementations can leave it empty.
    #[must_use]
    pub fn operation_failed(reason: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            key: String::new(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for rendezvous operations.
pub type RendezvousResult<T> = Result<T, RendezvousError>;
