//! release.rs
//! Absolute release bookkeeping for periodic tasks.
//! Every release is `last_release + period`; "now" never feeds back into the
//! schedule, so an overrun does not shift later releases.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct ReleaseClock {
    period: Duration,
    last_release: Instant,
    started: bool,
}

/// What happened at one release point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseTiming {
    pub release: Instant,
    /// How long after its release instant the job actually started.
    pub jitter: Duration,
    /// Job started after its *next* release was already due.
    pub late: bool,
}

impl ReleaseClock {
    /// The first release happens at `epoch` itself.
    pub fn new(epoch: Instant, period: Duration) -> Self {
        Self {
            period,
            last_release: epoch,
            started: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_release(&self) -> Option<Instant> {
        self.started.then_some(self.last_release)
    }

    pub fn next_release(&self) -> Instant {
        if self.started {
            self.last_release + self.period
        } else {
            self.last_release
        }
    }

    /// Time left until the next release, `None` when already due.
    pub fn time_until_release(&self, now: Instant) -> Option<Duration> {
        let next = self.next_release();
        (now < next).then(|| next - now)
    }

    /// Consume the pending release, given the instant the job starts.
    pub fn mark_released(&mut self, started_at: Instant) -> ReleaseTiming {
        let release = self.next_release();
        self.last_release = release;
        self.started = true;

        let jitter = started_at.saturating_duration_since(release);
        ReleaseTiming {
            release,
            jitter,
            late: jitter >= self.period,
        }
    }
}
