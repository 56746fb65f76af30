//! Metrics collection for the cruise-control run.
//!
//! Two halves:
//! - **MetricsRecorder:** tasks push `MetricEvent`s into a lock-free queue
//!   (16K capacity). `record()` never blocks; a full queue drops the event and
//!   bumps a counter.
//! - **Metrics:** the folded view behind a mutex, filled by `collect()` from a
//!   collector thread and read for snapshots and the end-of-run summary.
//!
//! Folded contents: per-task release counts, late releases and release
//! jitter; watchdog checks and overload warnings; bounded traces of velocity,
//! position and throttle (last 1000 points).

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_queue::ArrayQueue;
use log::debug;

use crate::rtos::release::ReleaseTiming;

/// One observation pushed by a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    Release { task: &'static str, jitter_us: u64, late: bool },
    Watchdog { fed: bool },
    Vehicle { velocity: i32, position: i32 },
    Throttle(i32),
    ExtraLoad(u8),
}

impl MetricEvent {
    pub fn release(task: &'static str, timing: &ReleaseTiming) -> Self {
        MetricEvent::Release {
            task,
            jitter_us: timing.jitter.as_micros() as u64,
            late: timing.late,
        }
    }
}

/// Release statistics for one periodic task.
#[derive(Debug, Default, Clone)]
pub struct TaskStats {
    pub releases: u64,
    pub late_releases: u64,
    pub jitter_us: VecDeque<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub tasks: BTreeMap<&'static str, TaskStats>,

    /// Vehicle traces (last 1000 samples)
    pub velocity: VecDeque<f64>,
    pub position: VecDeque<f64>,
    pub throttle: VecDeque<f64>,

    pub watchdog_checks: u64,
    pub overload_warnings: u64,

    pub extra_load_value: u8,

    /// Events lost to a full recorder queue
    pub dropped_events: u64,
}

impl Metrics {
    pub fn apply(&mut self, event: MetricEvent) {
        match event {
            MetricEvent::Release { task, jitter_us, late } => {
                let stats = self.tasks.entry(task).or_default();
                stats.releases += 1;
                if late {
                    stats.late_releases += 1;
                }
                push_capped_u64(&mut stats.jitter_us, jitter_us);
            }
            MetricEvent::Watchdog { fed } => {
                self.watchdog_checks += 1;
                if !fed {
                    self.overload_warnings += 1;
                }
            }
            MetricEvent::Vehicle { velocity, position } => {
                push_capped(&mut self.velocity, velocity as f64);
                push_capped(&mut self.position, position as f64);
            }
            MetricEvent::Throttle(throttle) => push_capped(&mut self.throttle, throttle as f64),
            MetricEvent::ExtraLoad(value) => self.extra_load_value = value,
        }
    }

    pub fn total_late_releases(&self) -> u64 {
        self.tasks.values().map(|s| s.late_releases).sum()
    }
}

const EVENT_QUEUE_CAPACITY: usize = 16_384;

/// Non-blocking recorder shared by every task.
///
/// `record()` is a lock-free push. The mutex around [`Metrics`] is taken only
/// by `collect()`, `snapshot()` and their callers, never on a task's path.
#[derive(Clone)]
pub struct MetricsRecorder {
    queue: Arc<ArrayQueue<MetricEvent>>,
    dropped: Arc<AtomicU64>,
    collected: Arc<Mutex<Metrics>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
            dropped: Arc::new(AtomicU64::new(0)),
            collected: Arc::new(Mutex::new(Metrics::default())),
        }
    }

    /// Appends the event (lock-free). Counts it as dropped if the queue is full.
    #[inline]
    pub fn record(&self, event: MetricEvent) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Folds every queued event into the collected metrics. Returns how many.
    pub fn collect(&self) -> usize {
        let mut metrics = self.lock();
        drain_into(&self.queue, &mut metrics)
    }

    /// Collects, then returns a copy of everything seen so far.
    pub fn snapshot(&self) -> Metrics {
        let mut metrics = self.lock();
        drain_into(&self.queue, &mut metrics);
        metrics.dropped_events = self.dropped();
        metrics.clone()
    }

    /// Spawns a thread that collects every `interval` until `running` drops,
    /// then once more for whatever the tasks pushed last.
    pub fn start_collector(&self, running: Arc<AtomicBool>, interval: Duration) -> JoinHandle<()> {
        let recorder = self.clone();
        thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                thread::sleep(interval);
                recorder.collect();
            }
            let n = recorder.collect();
            debug!("[Metrics] collector stopped ({} trailing events)", n);
        })
    }

    /// Lock the collected metrics, recovering the guard if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Metrics> {
        match self.collected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

fn drain_into(queue: &ArrayQueue<MetricEvent>, metrics: &mut Metrics) -> usize {
    let mut n = 0;
    while let Some(event) = queue.pop() {
        metrics.apply(event);
        n += 1;
    }
    n
}

pub const MAX_POINTS: usize = 1_000;

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Computes min, max, mean for float buffer.
pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

/// Same as [`calculate_stats`] for u64 buffers (cast to f64).
pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}
