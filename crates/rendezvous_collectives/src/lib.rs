//! # RENDEZVOUS Collectives
//!
//! Concrete collective ops built on the `rendezvous_core` barrier, plus the
//! helpers that decide who takes part in one.
//!
//! ## Modules
//!
//! - [`all_reduce`]: elementwise sum, product, min or max across participants
//! - [`groups`]: replica groups and device assignments
//!
//! ## Example
//!
//! ```rust,ignore
//! use rendezvous_collectives::{all_reduce, AllReduce, AllReducePayload, ReduceBuffer, ReductionKind};
//! use rendezvous_core::RendezvousRegistry;
//!
//! let registry = RendezvousRegistry::new(|_key| AllReduce::<f32>::new());
//!
//! // On each participating thread:
//! let payload = AllReducePayload::new(vec![ReduceBuffer::new(local)], ReductionKind::Sum);
//! let out = all_reduce(&registry, ParticipantData::new(key, ordinal, stream, payload))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod all_reduce;
pub mod error;
pub mod groups;

pub use all_reduce::{
    all_reduce, AllReduce, AllReducePayload, PrimitiveType, ReduceBuffer, ReduceElement,
    ReductionKind,
};
pub use error::{CollectiveError, CollectiveResult};
pub use groups::{
    participating_devices, participating_replicas, DeviceAssignment, LogicalIds, ReplicaGroup,
};
