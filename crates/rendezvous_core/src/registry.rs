//! # Rendezvous Registry
//!
//! Process-wide map from [`RendezvousKey`] to the live [`Rendezvous`] for that
//! key. The registry only keeps weak references: a rendezvous lives exactly as
//! long as some participant holds it, and once the last participant lets go
//! the next lookup for the same key creates a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::RendezvousConfig;
use crate::key::RendezvousKey;
use crate::rendezvous::{CollectiveOp, Rendezvous};

type OpFactory<Op> = Box<dyn Fn(&RendezvousKey) -> Op + Send + Sync>;

/// Hands out shared rendezvous objects by key.
///
/// ## Usage
///
/// ```rust,ignore
/// let registry = RendezvousRegistry::new(|_key| AllReduce::<f32>::new());
///
/// // On every participating thread:
/// let out = submit_participant(|| registry.get_or_create(&key), participant)?;
/// ```
pub struct RendezvousRegistry<Op: CollectiveOp> {
    entries: Mutex<HashMap<RendezvousKey, Weak<Rendezvous<Op>>>>,
    factory: OpFactory<Op>,
    config: RendezvousConfig,
}

impl<Op: CollectiveOp> RendezvousRegistry<Op> {
    /// Creates a registry with the default configuration.
    ///
    /// `factory` builds the collective for every new rendezvous.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&RendezvousKey) -> Op + Send + Sync + 'static,
    {
        Self::with_config(RendezvousConfig::default(), factory)
    }

    /// Creates a registry whose rendezvous objects use `config`.
    pub fn with_config<F>(config: RendezvousConfig, factory: F) -> Self
    where
        F: Fn(&RendezvousKey) -> Op + Send + Sync + 'static,
    {
        Self {
            entries: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
            config,
        }
    }

    /// Configuration used for new rendezvous objects.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RendezvousConfig {
        &self.config
    }

    /// Returns the live rendezvous for `key`, creating it if there is none.
    pub fn get_or_create(&self, key: &RendezvousKey) -> Arc<Rendezvous<Op>> {
        let mut entries = self.entries.lock();
        if let Some(live) = entries.get(key).and_then(Weak::upgrade) {
            return live;
        }

        entries.retain(|_, entry| entry.strong_count() > 0);
        let rendezvous = Arc::new(Rendezvous::with_config(
            key.clone(),
            (self.factory)(key),
            &self.config,
        ));
        entries.insert(key.clone(), Arc::downgrade(&rendezvous));
        tracing::debug!(key = %key, live = entries.len(), "created rendezvous");
        rendezvous
    }

    /// Number of rendezvous objects still held by some participant.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// Returns true if no rendezvous is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<Op: CollectiveOp> fmt::Debug for RendezvousRegistry<Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendezvousRegistry")
            .field("live", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
