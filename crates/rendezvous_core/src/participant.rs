//! # Participant Records
//!
//! Every thread joining a rendezvous submits one [`ParticipantData`]. The
//! header (key, device ordinal, stream) is shared by all collectives; the
//! payload is whatever the concrete collective needs.

use std::fmt;

use crate::key::RendezvousKey;

/// Opaque handle to an execution stream owned by the caller.
///
/// The rendezvous never dereferences it. It is only used to identify and
/// order work in diagnostics and, where a collective needs it, to find the
/// caller's stream again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    /// Wraps a raw stream token.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw token.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Operation-specific data carried by a participant.
pub trait ParticipantPayload: Send + Sync {
    /// Short human-readable description used in diagnostics.
    fn describe(&self) -> String;
}

impl ParticipantPayload for () {
    fn describe(&self) -> String {
        String::new()
    }
}

/// One thread's contribution to a rendezvous.
#[derive(Clone, Debug)]
pub struct ParticipantData<P> {
    /// The rendezvous this participant targets.
    pub rendezvous_key: RendezvousKey,
    /// Local device ordinal this thread drives.
    pub device_ordinal: usize,
    /// Stream the collective runs on.
    pub stream: StreamHandle,
    /// Operation-specific payload.
    pub payload: P,
}

impl<P: ParticipantPayload> ParticipantData<P> {
    /// Creates a participant record.
    #[must_use]
    pub fn new(
        rendezvous_key: RendezvousKey,
        device_ordinal: usize,
        stream: StreamHandle,
        payload: P,
    ) -> Self {
        Self {
            rendezvous_key,
            device_ordinal,
            stream,
            payload,
        }
    }
}

impl<P: ParticipantPayload> fmt::Display for ParticipantData<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParticipantData{")?;
        let payload = self.payload.describe();
        if !payload.is_empty() {
            write!(f, "{payload}, ")?;
        }
        write!(
            f,
            "rendezvous_key={}, device_ordinal={}, stream={}}}",
            self.rendezvous_key, self.device_ordinal, self.stream
        )
    }
}
