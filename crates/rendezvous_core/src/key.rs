//! # Rendezvous Keys
//!
//! A [`RendezvousKey`] decides which threads meet each other. The rules:
//!
//! - Only ops with the same [`RunId`] communicate. Independent executions of
//!   the same program never share a rendezvous.
//! - Only ops with the same set of participating devices communicate. This is
//!   what separates replica groups, e.g. one all-reduce over devices `{0, 2}`
//!   and another over `{1, 3}`.
//! - Cross-module ops only meet ops with the same channel id, cross-replica ops
//!   only meet ops from the same module. Both are folded into `op_id`, with
//!   [`CollectiveOpKind`] telling the two scopes apart.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one execution of a program across all participating threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

impl RunId {
    /// Allocates a process-unique run id.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps an explicit run id value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global identifier of a device, unique across the whole job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalDeviceId(pub u32);

impl fmt::Display for GlobalDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scope of a collective op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectiveOpKind {
    /// Participants come from different modules sharing a channel id.
    CrossModule,
    /// Participants are replicas of the same module.
    CrossReplica,
}

impl fmt::Display for CollectiveOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossModule => f.write_str("cross_module"),
            Self::CrossReplica => f.write_str("cross_replica"),
        }
    }
}

/// Key identifying one rendezvous.
///
/// Equality and hashing cover every field, so the key can be used directly as
/// a map key by the registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RendezvousKey {
    run_id: RunId,
    global_devices: Vec<GlobalDeviceId>,
    num_local_participants: usize,
    collective_op_kind: CollectiveOpKind,
    op_id: i64,
}

impl RendezvousKey {
    /// Creates a new key.
    ///
    /// # Panics
    ///
    /// Panics if `num_local_participants` is zero.
    #[must_use]
    pub fn new(
        run_id: RunId,
        global_devices: Vec<GlobalDeviceId>,
        num_local_participants: usize,
        collective_op_kind: CollectiveOpKind,
        op_id: i64,
    ) -> Self {
        assert!(
            num_local_participants > 0,
            "A rendezvous needs at least one local participant"
        );
        Self {
            run_id,
            global_devices,
            num_local_participants,
            collective_op_kind,
            op_id,
        }
    }

    /// Returns the same key for a different op of the same run.
    #[must_use]
    pub fn with_op_id(&self, op_id: i64) -> Self {
        Self {
            op_id,
            ..self.clone()
        }
    }

    /// Run this rendezvous belongs to.
    #[inline]
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Participating devices, in order.
    #[inline]
    #[must_use]
    pub fn global_devices(&self) -> &[GlobalDeviceId] {
        &self.global_devices
    }

    /// Number of threads in this process expected to arrive.
    #[inline]
    #[must_use]
    pub const fn num_local_participants(&self) -> usize {
        self.num_local_participants
    }

    /// Scope of the op.
    #[inline]
    #[must_use]
    pub const fn collective_op_kind(&self) -> CollectiveOpKind {
        self.collective_op_kind
    }

    /// Channel id or module id, depending on the kind.
    #[inline]
    #[must_use]
    pub const fn op_id(&self) -> i64 {
        self.op_id
    }
}

impl fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RendezvousKey{{run_id={}, global_devices=[", self.run_id)?;
        for (i, device) in self.global_devices.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{device}")?;
        }
        write!(
            f,
            "], num_local_participants={}, collective_op_kind={}, op_id={}}}",
            self.num_local_participants, self.collective_op_kind, self.op_id
        )
    }
}
