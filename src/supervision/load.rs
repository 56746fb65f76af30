//! Load injection for overload experiments.
//!
//! Two tasks live here:
//! - `LoadFeeder`: background task that keeps the watchdog's feed token posted
//! - `ExtraLoadGenerator`: stress task that burns CPU for a switch-selected time
//!   every 25 ms, starving everything below it
//!
//! The busy-wait is deliberate CPU burning. It is only registered when the
//! configuration asks for extra load.

use std::{
    hint::black_box,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::hal::board::{Board, Input, LOAD_SWITCHES};
use crate::rtos::scheduler::{BackgroundTask, PeriodicTask};
use crate::supervision::watchdog::FeedSender;
use crate::utils::metrics::{MetricEvent, MetricsRecorder};

/// Busy-wait per unit of switch value.
pub const LOAD_UNIT: Duration = Duration::from_micros(100);

pub struct LoadFeeder {
    feed: FeedSender,
}

impl LoadFeeder {
    pub fn new(feed: FeedSender) -> Self {
        Self { feed }
    }
}

impl BackgroundTask for LoadFeeder {
    fn name(&self) -> &'static str {
        "feeder"
    }

    fn step(&mut self) {
        self.feed.post();
        thread::yield_now();
    }
}

/// SW10..SW17 as an 8-bit value, SW10 the least significant bit.
pub fn read_load_value(board: &dyn Board) -> u8 {
    (0..LOAD_SWITCHES)
        .filter(|&bit| board.read_input(Input::LoadSwitch(bit)))
        .fold(0u8, |acc, bit| acc | (1 << bit))
}

pub fn load_duration(value: u8) -> Duration {
    LOAD_UNIT * u32::from(value)
}

/// Spin until `duration` has elapsed. Returns the iterations spent.
pub fn busy_wait(duration: Duration) -> u64 {
    let start = Instant::now();
    let mut iter: u64 = 0;
    while start.elapsed() < duration {
        iter = black_box(iter.wrapping_add(1));
    }
    iter
}

pub struct ExtraLoadGenerator {
    board: Arc<dyn Board>,
    period: Duration,
    last_value: Option<u8>,
    metrics: MetricsRecorder,
}

impl ExtraLoadGenerator {
    pub fn new(board: Arc<dyn Board>, period: Duration, metrics: MetricsRecorder) -> Self {
        Self {
            board,
            period,
            last_value: None,
            metrics,
        }
    }

    /// One job: sample the switches and burn `value × 100 µs`.
    pub fn run_once(&mut self) -> u8 {
        let value = read_load_value(self.board.as_ref());
        if self.last_value != Some(value) {
            info!(
                "[ExtraLoad] value {} -> {:?} busy per {:?} period",
                value,
                load_duration(value),
                self.period
            );
            self.last_value = Some(value);
            self.metrics.record(MetricEvent::ExtraLoad(value));
        }

        if value > 0 {
            let spins = busy_wait(load_duration(value));
            debug!("[ExtraLoad] {} spins", spins);
        }
        value
    }
}

impl PeriodicTask for ExtraLoadGenerator {
    fn name(&self) -> &'static str {
        "extra_load"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.run_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim_board::SimBoard;
    use crate::supervision::watchdog::{WatchdogMonitor, WatchdogVerdict, feed_line};

    #[test]
    fn switches_read_as_little_endian_value() {
        let board = SimBoard::new();
        assert_eq!(read_load_value(&board), 0);
        board.set_load_switches(0b1010_0101);
        assert_eq!(read_load_value(&board), 0b1010_0101);
        board.set_load_switches(255);
        assert_eq!(read_load_value(&board), 255);
    }

    #[test]
    fn load_scales_with_value() {
        assert_eq!(load_duration(0), Duration::ZERO);
        assert_eq!(load_duration(10), Duration::from_millis(1));
        // more than the 25 ms period
        assert_eq!(load_duration(255), Duration::from_micros(25_500));
    }

    #[test]
    fn busy_wait_lasts_at_least_the_duration() {
        let start = Instant::now();
        busy_wait(Duration::from_millis(3));
        assert!(start.elapsed() >= Duration::from_millis(3));
    }

    #[test]
    fn zero_value_returns_immediately() {
        let board = Arc::new(SimBoard::new());
        let mut generator =
            ExtraLoadGenerator::new(board, Duration::from_millis(25), MetricsRecorder::new());
        let start = Instant::now();
        assert_eq!(generator.run_once(), 0);
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn generator_burns_selected_time_and_records_value() {
        let board = Arc::new(SimBoard::new());
        board.set_load_switches(20);
        let metrics = MetricsRecorder::new();
        let mut generator =
            ExtraLoadGenerator::new(board.clone(), Duration::from_millis(25), metrics.clone());

        let start = Instant::now();
        generator.release();
        assert!(start.elapsed() >= Duration::from_millis(2));
        assert_eq!(metrics.snapshot().extra_load_value, 20);
    }

    #[test]
    fn feeder_step_satisfies_watchdog() {
        let (tx, rx) = feed_line();
        let wd = WatchdogMonitor::new(Duration::from_millis(1000), rx, MetricsRecorder::new());
        let mut feeder = LoadFeeder::new(tx);
        feeder.step();
        assert_eq!(wd.check(Duration::from_millis(10)), WatchdogVerdict::Fed);
    }
}
