//! # The Rendezvous
//!
//! The set of threads that want to run a collective op together all pick the
//! same [`Rendezvous`] out of a [`RendezvousRegistry`](crate::RendezvousRegistry)
//! and call [`submit_participant`]. A rendezvous can only be used once.
//!
//! ## Lifecycle
//!
//! ```text
//!  Collecting ──(last arrival)──> Executing ──(op published)──> Draining ──(last release)──> Retired
//!      │                              │                             │
//!  records pushed              primary runs the op         handles dropped,
//!  under the lock              exactly once                completion countdown
//! ```
//!
//! ## Teardown
//!
//! Returning from [`Rendezvous::submit`] is not enough. If a participant went
//! straight on to its next collective, it could ask the registry for the same
//! key while a sibling still holds this rendezvous, and submit to an object
//! that is already spent. [`submit_participant`] therefore drops its handle
//! and waits until every sibling has dropped theirs too. A failed collective
//! is torn down the same way.
//!
//! ## Hazard
//!
//! A participant whose key does not match the recorded ones is rejected and
//! does not count as arrived. The participants already recorded keep waiting
//! for an arrival that will never come, and the stuck-wait monitor is the only
//! thing that reports it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RendezvousConfig;
use crate::error::{RendezvousError, RendezvousResult};
use crate::key::RendezvousKey;
use crate::participant::{ParticipantData, ParticipantPayload};
use crate::sync::{Countdown, StuckWaitMonitor};

/// A collective operation run once all participants have arrived.
///
/// Implemented once per kind of collective (all-reduce, all-gather, ...).
pub trait CollectiveOp: Send + Sync {
    /// Per-participant input.
    type Payload: ParticipantPayload;
    /// Per-participant output.
    type Output: Send;

    /// Runs the collective over every participant.
    ///
    /// Called exactly once per rendezvous, from the primary thread, with all
    /// records in submission order. Must return one output per participant in
    /// the same order.
    ///
    /// # Errors
    ///
    /// Any error is delivered unchanged to every participant.
    fn run_collective_op(
        &self,
        participants: &[ParticipantData<Self::Payload>],
    ) -> RendezvousResult<Vec<Self::Output>>;
}

/// What a participant gets back from a rendezvous.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticipantOutput<O> {
    /// True for exactly one participant: the one that ran the op.
    pub is_primary: bool,
    /// Output of the collective for this participant.
    pub output: O,
}

/// Result of [`Rendezvous::submit`] for a participant that arrived.
#[derive(Debug)]
pub struct Submission<O> {
    /// This participant's output, or the error the collective failed with.
    pub output: RendezvousResult<ParticipantOutput<O>>,
    /// Countdown shared by all participants, used to coordinate teardown.
    pub completion: Arc<Countdown>,
}

/// Observable lifecycle stage of a rendezvous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendezvousStage {
    /// Waiting for participants to arrive.
    Collecting,
    /// All participants arrived, the op is running.
    Executing,
    /// The op finished, participants are releasing their handles.
    Draining,
    /// Every participant released its handle.
    Retired,
}

/// Outcome published by the primary for everyone else.
type Outcome<O> = RendezvousResult<Vec<Option<O>>>;

/// Single-use barrier for one collective op.
pub struct Rendezvous<Op: CollectiveOp> {
    /// Key all participants must agree on.
    key: RendezvousKey,
    /// The collective to run.
    op: Op,
    /// Reports participants that wait too long.
    monitor: StuckWaitMonitor,
    /// Records received so far, in submission order.
    participants: Mutex<Vec<ParticipantData<Op::Payload>>>,
    /// Initialization barrier: set by the one thread that runs the op.
    initialized: AtomicBool,
    /// Opens once every local participant has submitted.
    all_participants_present: Countdown,
    /// Opens once the primary has published the outcome.
    op_finished: Countdown,
    /// The outcome, one slot per participant.
    outcome: Mutex<Option<Outcome<Op::Output>>>,
    /// Handed to every participant for teardown.
    returned_blocking_counter: Arc<Countdown>,
}

impl<Op: CollectiveOp> Rendezvous<Op> {
    /// Creates a rendezvous with the default configuration.
    #[must_use]
    pub fn new(key: RendezvousKey, op: Op) -> Self {
        Self::with_config(key, op, &RendezvousConfig::default())
    }

    /// Creates a rendezvous.
    #[must_use]
    pub fn with_config(key: RendezvousKey, op: Op, config: &RendezvousConfig) -> Self {
        let expected = key.num_local_participants();
        Self {
            op,
            monitor: StuckWaitMonitor::from_config(config),
            participants: Mutex::new(Vec::with_capacity(expected)),
            initialized: AtomicBool::new(false),
            all_participants_present: Countdown::new(expected),
            op_finished: Countdown::new(1),
            outcome: Mutex::new(None),
            returned_blocking_counter: Arc::new(Countdown::new(expected)),
            key,
        }
    }

    /// Key of this rendezvous.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &RendezvousKey {
        &self.key
    }

    /// The collective this rendezvous runs.
    #[inline]
    #[must_use]
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Number of participants that have arrived.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.all_participants_present.initial() - self.all_participants_present.remaining()
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn stage(&self) -> RendezvousStage {
        if !self.initialized.load(Ordering::Acquire) {
            RendezvousStage::Collecting
        } else if !self.op_finished.is_zero() {
            RendezvousStage::Executing
        } else if !self.returned_blocking_counter.is_zero() {
            RendezvousStage::Draining
        } else {
            RendezvousStage::Retired
        }
    }

    /// Submits a participant and blocks until the collective has run.
    ///
    /// Most callers want [`submit_participant`], which also handles teardown.
    /// Once a participant has arrived it always gets a [`Submission`], even if
    /// the collective failed, so that it still takes part in teardown. The
    /// failure is in [`Submission::output`], identical for every participant.
    ///
    /// # Errors
    ///
    /// [`RendezvousError::IdentityMismatch`] if the participant's key differs
    /// from the participants already recorded. Only this caller is affected,
    /// and it does not count as arrived.
    ///
    /// # Panics
    ///
    /// Panics if the rendezvous already started executing, or if more
    /// participants submit than the key expects. A rendezvous is used once.
    pub fn submit(
        &self,
        participant: ParticipantData<Op::Payload>,
    ) -> RendezvousResult<Submission<Op::Output>> {
        let device_ordinal = participant.device_ordinal;
        let stream = participant.stream;

        let index = {
            let mut participants = self.participants.lock();
            let executing = self.initialized.load(Ordering::Acquire);
            assert!(
                !executing && participants.len() < self.key.num_local_participants(),
                "rendezvous used more than once: {} expects {} participants, {} recorded, \
                 executing={executing}",
                self.key,
                self.key.num_local_participants(),
                participants.len()
            );

            // Spot check for consistent keys among submitting threads.
            if let Some(recorded) = participants.last() {
                if recorded.rendezvous_key != participant.rendezvous_key {
                    return Err(RendezvousError::IdentityMismatch {
                        recorded: recorded.to_string(),
                        submitted: participant.to_string(),
                    });
                }
            }
            participants.push(participant);
            participants.len() - 1
        };

        // Wait for all participants to arrive.
        self.all_participants_present.decrement();
        self.monitor.wait(&self.all_participants_present, || {
            format!(
                "participant for device ordinal {device_ordinal}, stream {stream} waiting for all \
                 participants to arrive at rendezvous {}",
                self.key
            )
        });

        let is_primary = self.initialization_barrier();
        if is_primary {
            self.run_and_publish();
        } else {
            self.monitor.wait(&self.op_finished, || {
                format!(
                    "participant for device ordinal {device_ordinal}, stream {stream} waiting for \
                     the collective op of rendezvous {} to finish",
                    self.key
                )
            });
        }

        let output = self
            .take_output(index)
            .map(|output| ParticipantOutput { is_primary, output });
        Ok(Submission {
            output,
            completion: Arc::clone(&self.returned_blocking_counter),
        })
    }

    /// Returns true to exactly one caller, the primary.
    fn initialization_barrier(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs the op over the complete snapshot and publishes the outcome.
    fn run_and_publish(&self) {
        let snapshot = std::mem::take(&mut *self.participants.lock());
        tracing::debug!(
            key = %self.key,
            participants = snapshot.len(),
            "running collective op"
        );

        let outcome = match self.op.run_collective_op(&snapshot) {
            Ok(outputs) if outputs.len() < snapshot.len() => Err(RendezvousError::MissingOutput {
                key: self.key.to_string(),
                index: outputs.len(),
            }),
            Ok(outputs) => Ok(outputs.into_iter().map(Some).collect()),
            Err(RendezvousError::OperationFailed { key, reason }) if key.is_empty() => {
                Err(RendezvousError::OperationFailed {
                    key: self.key.to_string(),
                    reason,
                })
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            tracing::warn!(key = %self.key, error = %e, "collective op failed");
        }

        *self.outcome.lock() = Some(outcome);
        self.op_finished.decrement();
    }

    /// Takes this participant's output out of the published outcome.
    fn take_output(&self, index: usize) -> RendezvousResult<Op::Output> {
        let mut outcome = self.outcome.lock();
        match outcome.as_mut() {
            Some(Ok(outputs)) => outputs
                .get_mut(index)
                .and_then(Option::take)
                .ok_or_else(|| RendezvousError::MissingOutput {
                    key: self.key.to_string(),
                    index,
                }),
            Some(Err(e)) => Err(e.clone()),
            None => unreachable!("collective outcome read before it was published"),
        }
    }
}

impl<Op: CollectiveOp> fmt::Debug for Rendezvous<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rendezvous")
            .field("key", &self.key)
            .field("stage", &self.stage())
            .field("arrived", &self.arrived())
            .finish_non_exhaustive()
    }
}

/// Drops a participant's handle, then records that it has left.
///
/// The order matters: once every participant has left, no handle to the
/// rendezvous remains outside the registry.
struct Departure<Op: CollectiveOp> {
    rendezvous: Option<Arc<Rendezvous<Op>>>,
    completion: Arc<Countdown>,
}

impl<Op: CollectiveOp> Drop for Departure<Op> {
    fn drop(&mut self) {
        drop(self.rendezvous.take());
        self.completion.decrement();
    }
}

/// Joins a rendezvous and runs its collective.
///
/// `get_rendezvous` is typically a registry lookup. The handle it returns is
/// released before this function returns, and the function only returns once
/// every other participant has released theirs, so the caller can immediately
/// start its next collective.
///
/// # Errors
///
/// - [`RendezvousError::IdentityMismatch`] if the participant was rejected.
///   It never arrived, so it returns at once without teardown.
/// - The collective's error. Every participant gets it, after the same
///   teardown as a successful op.
///
/// # Panics
///
/// Panics if the rendezvous was already used (see [`Rendezvous::submit`]).
pub fn submit_participant<Op, G>(
    get_rendezvous: G,
    participant: ParticipantData<Op::Payload>,
) -> RendezvousResult<ParticipantOutput<Op::Output>>
where
    Op: CollectiveOp,
    G: FnOnce() -> Arc<Rendezvous<Op>>,
{
    let rendezvous = get_rendezvous();
    let monitor = rendezvous.monitor;
    let address = Arc::as_ptr(&rendezvous);
    let key = rendezvous.key().clone();

    // A rejected participant never arrived and takes no part in teardown.
    let Submission { output, completion } = rendezvous.submit(participant)?;

    drop(Departure {
        rendezvous: Some(rendezvous),
        completion: Arc::clone(&completion),
    });
    monitor.wait(&completion, || {
        format!(
            "participant waiting for all threads to drop their reference to the rendezvous \
             {address:p} ({key})"
        )
    });
    output
}
