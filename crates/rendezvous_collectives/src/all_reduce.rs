//! # All-Reduce
//!
//! Every participant contributes the same shape of buffers; every participant
//! gets back the elementwise reduction of all of them.
//!
//! ```text
//!   participant 0: [1, 2]  ─┐
//!   participant 1: [3, 4]  ─┼─ sum ─>  [9, 12] to every participant
//!   participant 2: [5, 6]  ─┘
//! ```
//!
//! The reduction runs once, on the primary, over the snapshot the rendezvous
//! hands it. Participants that disagree on buffer layout or reduction kind
//! fail the whole collective.

use std::fmt;
use std::marker::PhantomData;

use rendezvous_core::{
    submit_participant, CollectiveOp, GlobalDeviceId, ParticipantData, ParticipantOutput,
    ParticipantPayload, RendezvousRegistry, RendezvousResult,
};

use crate::error::{CollectiveError, CollectiveResult};

/// How elements from different participants are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReductionKind {
    /// Arithmetic sum. Integers wrap on overflow.
    Sum,
    /// Arithmetic product. Integers wrap on overflow.
    Product,
    /// Smallest element. A float NaN loses to any number.
    Min,
    /// Largest element. A float NaN loses to any number.
    Max,
}

impl fmt::Display for ReductionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Min => "min",
            Self::Max => "max",
        })
    }
}

/// Element type tag, reported in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Signed 32-bit integer.
    S32,
    /// Signed 64-bit integer.
    S64,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::U32 => "u32",
            Self::U64 => "u64",
        })
    }
}

/// An element type an all-reduce can combine.
pub trait ReduceElement: Copy + PartialOrd + Send + Sync + fmt::Debug + 'static {
    /// Tag of this type.
    const PRIMITIVE_TYPE: PrimitiveType;

    /// `self + other`, wrapping for integers.
    fn sum(self, other: Self) -> Self;

    /// `self * other`, wrapping for integers.
    fn product(self, other: Self) -> Self;

    /// Smaller of the two. For floats a NaN operand is ignored, as in
    /// [`f32::min`], so the result does not depend on operand order.
    fn minimum(self, other: Self) -> Self;

    /// Larger of the two. For floats a NaN operand is ignored, as in
    /// [`f32::max`].
    fn maximum(self, other: Self) -> Self;

    /// Combines two elements with `kind`.
    #[inline]
    fn combine(self, other: Self, kind: ReductionKind) -> Self {
        match kind {
            ReductionKind::Sum => self.sum(other),
            ReductionKind::Product => self.product(other),
            ReductionKind::Min => self.minimum(other),
            ReductionKind::Max => self.maximum(other),
        }
    }
}

macro_rules! impl_reduce_float {
    ($($ty:ty => $tag:ident),*) => {$(
        impl ReduceElement for $ty {
            const PRIMITIVE_TYPE: PrimitiveType = PrimitiveType::$tag;

            #[inline]
            fn sum(self, other: Self) -> Self {
                self + other
            }

            #[inline]
            fn product(self, other: Self) -> Self {
                self * other
            }

            #[inline]
            fn minimum(self, other: Self) -> Self {
                self.min(other)
            }

            #[inline]
            fn maximum(self, other: Self) -> Self {
                self.max(other)
            }
        }
    )*};
}

macro_rules! impl_reduce_int {
    ($($ty:ty => $tag:ident),*) => {$(
        impl ReduceElement for $ty {
            const PRIMITIVE_TYPE: PrimitiveType = PrimitiveType::$tag;

            #[inline]
            fn sum(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            #[inline]
            fn product(self, other: Self) -> Self {
                self.wrapping_mul(other)
            }

            #[inline]
            fn minimum(self, other: Self) -> Self {
                Ord::min(self, other)
            }

            #[inline]
            fn maximum(self, other: Self) -> Self {
                Ord::max(self, other)
            }
        }
    )*};
}

impl_reduce_float!(f32 => F32, f64 => F64);
impl_reduce_int!(i32 => S32, i64 => S64, u32 => U32, u64 => U64);

/// One buffer a participant contributes.
#[derive(Clone, Debug, PartialEq)]
pub struct ReduceBuffer<T> {
    /// Number of elements the buffer declares.
    pub element_count: usize,
    /// Source data. Must hold exactly `element_count` elements.
    pub source: Vec<T>,
}

impl<T: ReduceElement> ReduceBuffer<T> {
    /// Creates a buffer whose element count is the length of `source`.
    #[must_use]
    pub fn new(source: Vec<T>) -> Self {
        Self {
            element_count: source.len(),
            source,
        }
    }
}

/// All-reduce input of one participant.
#[derive(Clone, Debug, PartialEq)]
pub struct AllReducePayload<T> {
    /// Buffers to reduce, in the same order on every participant.
    pub buffers: Vec<ReduceBuffer<T>>,
    /// Reduction to apply. Must agree across participants.
    pub reduction_kind: ReductionKind,
    /// `(global id, local device ordinal)` of every local participant, in no
    /// particular order. When set, it must be the same on every participant
    /// and list every participant's ordinal.
    pub local_devices: Vec<(GlobalDeviceId, usize)>,
}

impl<T: ReduceElement> AllReducePayload<T> {
    /// Creates a payload with no local device list.
    #[must_use]
    pub fn new(buffers: Vec<ReduceBuffer<T>>, reduction_kind: ReductionKind) -> Self {
        Self {
            buffers,
            reduction_kind,
            local_devices: Vec::new(),
        }
    }

    /// Sets the local device list.
    #[must_use]
    pub fn with_local_devices(mut self, local_devices: Vec<(GlobalDeviceId, usize)>) -> Self {
        self.local_devices = local_devices;
        self
    }

    /// Global id of the local device with `ordinal`, if it is listed.
    #[must_use]
    pub fn global_device(&self, ordinal: usize) -> Option<GlobalDeviceId> {
        self.local_devices
            .iter()
            .find_map(|&(global, local)| (local == ordinal).then_some(global))
    }

    /// Local device list in a canonical order, for comparisons.
    fn sorted_local_devices(&self) -> Vec<(GlobalDeviceId, usize)> {
        let mut devices = self.local_devices.clone();
        devices.sort_unstable();
        devices
    }
}

impl<T: ReduceElement> ParticipantPayload for AllReducePayload<T> {
    fn describe(&self) -> String {
        let buffers: Vec<String> = self
            .buffers
            .iter()
            .map(|b| format!("{{element_count={}}}", b.element_count))
            .collect();
        format!(
            "buffers=[{}], primitive_type={}, reduction_kind={}",
            buffers.join(","),
            T::PRIMITIVE_TYPE,
            self.reduction_kind
        )
    }
}

/// The all-reduce collective.
pub struct AllReduce<T> {
    _element: PhantomData<fn() -> T>,
}

impl<T: ReduceElement> AllReduce<T> {
    /// Creates the collective.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _element: PhantomData,
        }
    }
}

impl<T: ReduceElement> Default for AllReduce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AllReduce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AllReduce")
    }
}

/// Checks that every participant has the layout, reduction and local device
/// list of the first.
fn validate<T: ReduceElement>(
    participants: &[ParticipantData<AllReducePayload<T>>],
) -> CollectiveResult<()> {
    let Some(first) = participants.first() else {
        return Ok(());
    };
    let reference = &first.payload;
    let reference_devices = reference.sorted_local_devices();

    for (index, participant) in participants.iter().enumerate() {
        let payload = &participant.payload;
        if payload.sorted_local_devices() != reference_devices {
            return Err(CollectiveError::LocalDevicesMismatch { index });
        }
        if !payload.local_devices.is_empty()
            && payload.global_device(participant.device_ordinal).is_none()
        {
            return Err(CollectiveError::DeviceNotLocal {
                index,
                device_ordinal: participant.device_ordinal,
            });
        }
        if payload.reduction_kind != reference.reduction_kind {
            return Err(CollectiveError::ReductionKindMismatch {
                index,
                expected: reference.reduction_kind,
                actual: payload.reduction_kind,
            });
        }
        if payload.buffers.len() != reference.buffers.len() {
            return Err(CollectiveError::BufferCountMismatch {
                index,
                expected: reference.buffers.len(),
                actual: payload.buffers.len(),
            });
        }
        for (buffer, (ours, theirs)) in payload.buffers.iter().zip(&reference.buffers).enumerate() {
            if ours.source.len() != ours.element_count {
                return Err(CollectiveError::ElementCountMismatch {
                    index,
                    buffer,
                    expected: ours.element_count,
                    actual: ours.source.len(),
                });
            }
            if ours.element_count != theirs.element_count {
                return Err(CollectiveError::ElementCountMismatch {
                    index,
                    buffer,
                    expected: theirs.element_count,
                    actual: ours.element_count,
                });
            }
        }
    }
    Ok(())
}

impl<T: ReduceElement> CollectiveOp for AllReduce<T> {
    type Payload = AllReducePayload<T>;
    type Output = Vec<Vec<T>>;

    fn run_collective_op(
        &self,
        participants: &[ParticipantData<AllReducePayload<T>>],
    ) -> RendezvousResult<Vec<Vec<Vec<T>>>> {
        validate(participants)?;
        let Some((first, rest)) = participants.split_first() else {
            return Ok(Vec::new());
        };
        let kind = first.payload.reduction_kind;

        let mut reduced: Vec<Vec<T>> = first
            .payload
            .buffers
            .iter()
            .map(|b| b.source.clone())
            .collect();
        for participant in rest {
            for (acc, buffer) in reduced.iter_mut().zip(&participant.payload.buffers) {
                for (a, &b) in acc.iter_mut().zip(&buffer.source) {
                    *a = a.combine(b, kind);
                }
            }
        }

        tracing::debug!(
            key = %first.rendezvous_key,
            primitive_type = %T::PRIMITIVE_TYPE,
            reduction_kind = %kind,
            buffers = reduced.len(),
            participants = participants.len(),
            "all-reduce complete"
        );
        Ok(vec![reduced; participants.len()])
    }
}

/// Runs an all-reduce for `participant`, looking its rendezvous up in `registry`.
///
/// # Errors
///
/// See [`submit_participant`]. Invalid participant sets surface as
/// [`RendezvousError::OperationFailed`](rendezvous_core::RendezvousError::OperationFailed)
/// on every participant.
pub fn all_reduce<T: ReduceElement>(
    registry: &RendezvousRegistry<AllReduce<T>>,
    participant: ParticipantData<AllReducePayload<T>>,
) -> RendezvousResult<ParticipantOutput<Vec<Vec<T>>>> {
    let key = participant.rendezvous_key.clone();
    submit_participant(|| registry.get_or_create(&key), participant)
}
