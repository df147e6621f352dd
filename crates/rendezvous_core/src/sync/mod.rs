//! # Blocking Primitives for Rendezvous Participants
//!
//! One OS thread per participant. Every suspension point of a rendezvous is a
//! wait on a [`Countdown`]:
//!
//! ```text
//! Thread 0 ──┐                         ┌──> run collective (primary)
//! Thread 1 ──┼──> [arrival countdown] ─┼──> wait for result
//! Thread N ──┘                         └──> wait for result
//!                                             │
//!                       [completion countdown] <┘  (drop handles, then wait)
//! ```
//!
//! Countdowns carry their own lock, so a parked thread never holds the lock
//! that guards the participant list. Long waits go through the
//! [`StuckWaitMonitor`], which reports them without ever giving up on them.

mod countdown;
mod stuck;

pub use countdown::Countdown;
pub use stuck::{wait_and_log_if_stuck, StuckWaitMonitor, WaitReport};
