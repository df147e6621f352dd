//! # Stuck-Wait Monitor
//!
//! Wraps a blocking [`Countdown`] wait. If the wait runs past the warning
//! interval, a warning is logged and the thread keeps waiting. Once it is
//! released, a second message records that it made progress after all.
//!
//! The monitor only affects what gets logged: it never cancels, times out or
//! aborts the wait.

use std::fmt::Display;
use std::time::{Duration, Instant};

use super::Countdown;
use crate::config::RendezvousConfig;

/// What happened during a monitored wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitReport {
    /// True if the wait outlived the warning interval and was reported.
    pub stalled: bool,
    /// Total time spent blocked.
    pub waited: Duration,
}

/// Reports waits that take longer than an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StuckWaitMonitor {
    interval: Duration,
}

impl StuckWaitMonitor {
    /// Creates a monitor warning after `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Creates a monitor from a configuration.
    #[must_use]
    pub const fn from_config(config: &RendezvousConfig) -> Self {
        Self::new(config.stuck_warning_interval())
    }

    /// Warning interval.
    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until `counter` opens.
    ///
    /// `desc` is only evaluated when an event is recorded.
    pub fn wait<F, D>(&self, counter: &Countdown, desc: F) -> WaitReport
    where
        F: Fn() -> D,
        D: Display,
    {
        let start = Instant::now();
        tracing::debug!(wait = %desc(), "begin wait");

        if counter.wait_for(self.interval) {
            tracing::debug!(wait = %desc(), "finished wait");
            return WaitReport {
                stalled: false,
                waited: start.elapsed(),
            };
        }

        tracing::warn!(
            waited_ms = millis(self.interval),
            wait = %desc(),
            "this thread has been waiting and may be stuck"
        );
        counter.wait();

        let waited = start.elapsed();
        tracing::warn!(
            waited_ms = millis(waited),
            wait = %desc(),
            "thread is unstuck, the warning above was a false positive; perhaps the interval is too short"
        );
        WaitReport {
            stalled: true,
            waited,
        }
    }
}

impl Default for StuckWaitMonitor {
    fn default() -> Self {
        Self::from_config(&RendezvousConfig::default())
    }
}

/// Waits on `counter` with the default interval, logging if it takes too long.
pub fn wait_and_log_if_stuck<F, D>(counter: &Countdown, desc: F) -> WaitReport
where
    F: Fn() -> D,
    D: Display,
{
    StuckWaitMonitor::default().wait(counter, desc)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
