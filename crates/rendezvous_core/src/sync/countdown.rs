//! # Countdown Latch
//!
//! Blocks until a fixed number of decrements have happened.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A countdown latch.
///
/// Created with a count; every [`Countdown::decrement`] lowers it by one and
/// waiters are released once it reaches zero. A latch never resets.
///
/// ## Usage
///
/// ```rust
/// use rendezvous_core::Countdown;
/// use std::sync::Arc;
///
/// let latch = Arc::new(Countdown::new(2));
/// let worker = {
///     let latch = Arc::clone(&latch);
///     std::thread::spawn(move || latch.decrement())
/// };
/// latch.decrement();
/// latch.wait();
/// assert!(latch.is_zero());
/// worker.join().unwrap();
/// ```
#[derive(Debug)]
pub struct Countdown {
    /// Decrements still missing.
    remaining: Mutex<usize>,
    /// Signalled when `remaining` reaches zero.
    zero: Condvar,
    /// Count the latch was created with.
    initial: usize,
}

impl Countdown {
    /// Creates a latch that opens after `count` decrements.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
            initial: count,
        }
    }

    /// Count the latch was created with.
    #[inline]
    #[must_use]
    pub const fn initial(&self) -> usize {
        self.initial
    }

    /// Decrements still missing before the latch opens.
    #[must_use]
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Returns true once the latch has opened.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.remaining() == 0
    }

    /// Records one decrement, waking all waiters if it was the last one.
    ///
    /// # Panics
    ///
    /// Panics if the latch is already at zero.
    pub fn decrement(&self) {
        let mut remaining = self.remaining.lock();
        assert!(*remaining > 0, "Countdown decremented below zero");
        *remaining -= 1;
        if *remaining == 0 {
            self.zero.notify_all();
        }
    }

    /// Blocks until the latch opens.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.zero.wait(&mut remaining);
        }
    }

    /// Blocks until the latch opens or `timeout` elapses.
    ///
    /// Returns true if the latch is open.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            if self.zero.wait_until(&mut remaining, deadline).timed_out() {
                return *remaining == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_count_is_open() {
        let latch = Countdown::new(0);
        assert!(latch.is_zero());
        latch.wait();
        assert!(latch.wait_for(Duration::from_millis(1)));
    }

    #[test]
    fn test_decrement_to_zero() {
        let latch = Countdown::new(3);
        assert_eq!(latch.initial(), 3);
        latch.decrement();
        latch.decrement();
        assert_eq!(latch.remaining(), 1);
        assert!(!latch.wait_for(Duration::from_millis(10)));
        latch.decrement();
        assert!(latch.is_zero());
        assert!(latch.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_released_by_other_threads() {
        let latch = Arc::new(Countdown::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                thread::spawn(move || latch.decrement())
            })
            .collect();

        latch.wait();
        assert!(latch.is_zero());

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "Countdown decremented below zero")]
    fn test_over_decrement_panics() {
        let latch = Countdown::new(1);
        latch.decrement();
        latch.decrement();
    }
}
