//! watchdog.rs
//! Overload detection.
//!
//! The lowest-priority feeder keeps posting a single token on the feed line.
//! The watchdog, at the highest priority, takes the token once per period.
//! If the feeder was starved for a whole period there is no token to take,
//! and the watchdog reports an overload. Reporting is non-fatal: the system
//! keeps running.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};

use crate::rtos::scheduler::PeriodicTask;
use crate::utils::metrics::{MetricEvent, MetricsRecorder};

/// Posting side of the feed line. Posting while a token is pending is a no-op.
#[derive(Clone)]
pub struct FeedSender {
    tx: Sender<()>,
}

pub struct FeedReceiver {
    rx: Receiver<()>,
}

/// Binary token between the feeder and the watchdog.
pub fn feed_line() -> (FeedSender, FeedReceiver) {
    let (tx, rx) = channel::bounded(1);
    (FeedSender { tx }, FeedReceiver { rx })
}

impl FeedSender {
    /// Returns false only once the watchdog side is gone.
    pub fn post(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Fed,
    Overload,
}

pub struct WatchdogMonitor {
    period: Duration,
    feed: FeedReceiver,
    metrics: MetricsRecorder,
}

impl WatchdogMonitor {
    pub fn new(period: Duration, feed: FeedReceiver, metrics: MetricsRecorder) -> Self {
        Self { period, feed, metrics }
    }

    /// Take the token, waiting at most `timeout` for it.
    pub fn check(&self, timeout: Duration) -> WatchdogVerdict {
        let verdict = match self.feed.rx.recv_timeout(timeout) {
            Ok(()) => WatchdogVerdict::Fed,
            Err(RecvTimeoutError::Timeout) => {
                warn!("System overload! Background feeder starved for {:?}", timeout);
                WatchdogVerdict::Overload
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("System overload! Feed line closed, no feeder running");
                WatchdogVerdict::Overload
            }
        };
        debug!("[Watchdog] {:?}", verdict);

        self.metrics.record(MetricEvent::Watchdog {
            fed: verdict == WatchdogVerdict::Fed,
        });
        verdict
    }
}

impl PeriodicTask for WatchdogMonitor {
    fn name(&self) -> &'static str {
        "watchdog"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.check(self.period);
    }

    fn supervisor(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Instant};

    #[test]
    fn posting_twice_keeps_one_token() {
        let (tx, rx) = feed_line();
        assert!(tx.post());
        assert!(tx.post());
        assert_eq!(rx.rx.len(), 1);
    }

    #[test]
    fn fed_watchdog_does_not_warn() {
        let metrics = MetricsRecorder::new();
        let (tx, rx) = feed_line();
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, metrics.clone());

        tx.post();
        assert_eq!(wd.check(Duration::from_millis(50)), WatchdogVerdict::Fed);

        let m = metrics.snapshot();
        assert_eq!(m.watchdog_checks, 1);
        assert_eq!(m.overload_warnings, 0);
    }

    #[test]
    fn starved_watchdog_reports_overload_after_timeout() {
        let metrics = MetricsRecorder::new();
        let (_tx, rx) = feed_line();
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, metrics.clone());

        let start = Instant::now();
        assert_eq!(wd.check(Duration::from_millis(30)), WatchdogVerdict::Overload);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(metrics.snapshot().overload_warnings, 1);
    }

    #[test]
    fn token_consumed_each_check() {
        let metrics = MetricsRecorder::new();
        let (tx, rx) = feed_line();
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, metrics.clone());

        tx.post();
        assert_eq!(wd.check(Duration::from_millis(10)), WatchdogVerdict::Fed);
        assert_eq!(wd.check(Duration::from_millis(10)), WatchdogVerdict::Overload);
    }

    #[test]
    fn late_feed_within_the_window_counts() {
        let metrics = MetricsRecorder::new();
        let (tx, rx) = feed_line();
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, metrics);

        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.post();
        });
        assert_eq!(wd.check(Duration::from_millis(500)), WatchdogVerdict::Fed);
        feeder.join().unwrap();
    }

    #[test]
    fn dropped_feeder_is_an_overload() {
        let (tx, rx) = feed_line();
        drop(tx);
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, MetricsRecorder::new());
        assert_eq!(wd.check(Duration::from_millis(10)), WatchdogVerdict::Overload);
    }
}
