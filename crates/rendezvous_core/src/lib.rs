//! # RENDEZVOUS Core
//!
//! Single-use barrier that lets a fixed group of threads run one collective
//! operation together, exactly once, and then tear the shared object down
//! without any thread reusing it for its next op.
//!
//! ## Architecture Rules
//!
//! 1. **One thread per participant** - every participant blocks on its own thread
//! 2. **Never block under a lock** - countdowns carry their own synchronization
//! 3. **Exactly once** - a single atomic flag picks the thread that runs the op
//! 4. **Report, never abandon** - long waits are logged, not timed out
//!
//! ## Example
//!
//! ```rust,ignore
//! use rendezvous_core::{submit_participant, RendezvousRegistry};
//!
//! let registry = RendezvousRegistry::new(|_key| MyCollective::default());
//!
//! // On each of the N participating threads:
//! let out = submit_participant(|| registry.get_or_create(&key), participant)?;
//! if out.is_primary {
//!     // this thread ran the collective
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod key;
pub mod participant;
pub mod registry;
pub mod rendezvous;
pub mod sync;

pub use config::RendezvousConfig;
pub use error::{RendezvousError, RendezvousResult};
pub use key::{CollectiveOpKind, GlobalDeviceId, RendezvousKey, RunId};
pub use participant::{ParticipantData, ParticipantPayload, StreamHandle};
pub use registry::RendezvousRegistry;
pub use rendezvous::{
    submit_participant, CollectiveOp, ParticipantOutput, Rendezvous, RendezvousStage, Submission,
};
pub use sync::{wait_and_log_if_stuck, Countdown, StuckWaitMonitor, WaitReport};
