//! scheduler.rs
//! Fixed-priority periodic release of tasks on OS threads.
//!
//! - Rate-monotonic priorities: re-derived from the registered periods on every start
//! - Drift-free releases: ReleaseClock anchors every task to one shared epoch
//! - Single modeled CPU: all task threads pinned to `pin_core` via core_affinity
//! - Failing to raise priority or pin a thread is logged, never fatal

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use core_affinity::CoreId;
use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority, ThreadPriorityValue};

use crate::rtos::release::ReleaseClock;
use crate::utils::error::{Result, SystemError};
use crate::utils::metrics::{MetricEvent, MetricsRecorder};

/// Gap between `start()` and the first release so every thread is up before
/// the common epoch.
const STARTUP_OFFSET: Duration = Duration::from_millis(20);
const SPIN_NS: u32 = 100_000;

/// A job released once per period for the lifetime of the system.
pub trait PeriodicTask: Send {
    fn name(&self) -> &'static str;
    fn period(&self) -> Duration;
    /// One job: read inputs, compute, publish. Must not block except for a
    /// bounded wait shorter than the period.
    fn release(&mut self);
    /// Supervisors sit above every rate-monotonic level so that overload
    /// cannot starve the task that reports it.
    fn supervisor(&self) -> bool {
        false
    }
}

/// Work that runs whenever nothing periodic is ready.
pub trait BackgroundTask: Send {
    fn name(&self) -> &'static str;
    fn step(&mut self);
}

/// Larger value = more urgent. `BACKGROUND` sits below every periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const BACKGROUND: Priority = Priority(0);

    fn thread_priority(self) -> ThreadPriority {
        if self == Priority::BACKGROUND {
            return ThreadPriority::Min;
        }
        let value = self.0.saturating_mul(10).clamp(1, 99);
        ThreadPriorityValue::try_from(value)
            .map(ThreadPriority::Crossplatform)
            .unwrap_or(ThreadPriority::Max)
    }
}

/// Rate-monotonic assignment: the shortest period gets the highest priority,
/// equal periods share a level. Output is index-aligned with `periods`.
pub fn rate_monotonic(periods: &[Duration]) -> Vec<Priority> {
    let mut distinct = periods.to_vec();
    distinct.sort();
    distinct.dedup();
    let levels = distinct.len();

    periods
        .iter()
        .map(|p| {
            let rank = distinct.partition_point(|d| d < p);
            Priority(u8::try_from(levels - rank).unwrap_or(u8::MAX))
        })
        .collect()
}

/// Rate-monotonic levels for ordinary tasks, one level above all of them for
/// supervisors. Index-aligned with `periods`.
pub fn assign_priorities(periods: &[Duration], supervisor: &[bool]) -> Vec<Priority> {
    let ordinary: Vec<Duration> = periods
        .iter()
        .zip(supervisor)
        .filter(|(_, s)| !**s)
        .map(|(p, _)| *p)
        .collect();
    let levels = rate_monotonic(&ordinary);
    let top = levels.iter().max().copied().unwrap_or(Priority::BACKGROUND);
    let supervisor_level = Priority(top.0.saturating_add(1));

    let mut levels = levels.into_iter();
    supervisor
        .iter()
        .map(|&s| {
            if s {
                supervisor_level
            } else {
                levels.next().unwrap_or(top)
            }
        })
        .collect()
}

/// Registered task set. Consumed by [`PeriodicScheduler::start`].
pub struct PeriodicScheduler {
    periodic: Vec<Box<dyn PeriodicTask>>,
    background: Vec<Box<dyn BackgroundTask>>,
    pin_core: Option<usize>,
    metrics: MetricsRecorder,
}

impl PeriodicScheduler {
    pub fn new(pin_core: Option<usize>, metrics: MetricsRecorder) -> Self {
        Self {
            periodic: Vec::new(),
            background: Vec::new(),
            pin_core,
            metrics,
        }
    }

    pub fn add_periodic<T: PeriodicTask + 'static>(&mut self, task: T) -> &mut Self {
        self.periodic.push(Box::new(task));
        self
    }

    pub fn add_background<T: BackgroundTask + 'static>(&mut self, task: T) -> &mut Self {
        self.background.push(Box::new(task));
        self
    }

    /// (name, period, priority) for every periodic task, in registration order.
    pub fn priorities(&self) -> Vec<(&'static str, Duration, Priority)> {
        let periods: Vec<Duration> = self.periodic.iter().map(|t| t.period()).collect();
        let supervisor: Vec<bool> = self.periodic.iter().map(|t| t.supervisor()).collect();
        self.periodic
            .iter()
            .zip(assign_priorities(&periods, &supervisor))
            .map(|(t, p)| (t.name(), t.period(), p))
            .collect()
    }

    /// Derive priorities, spawn one thread per task and release from a shared epoch.
    pub fn start(self, running: Arc<AtomicBool>) -> Result<SchedulerHandle> {
        if self.periodic.is_empty() {
            return Err(SystemError::NoTasks);
        }
        if let Some(task) = self.periodic.iter().find(|t| t.period().is_zero()) {
            return Err(SystemError::ZeroPeriod { task: task.name() });
        }

        let assignment = self.priorities();
        for (name, period, prio) in &assignment {
            info!("[Scheduler] {:<10} period={:?} priority={}", name, period, prio.0);
        }

        let core = self.resolve_core();
        let epoch = Instant::now() + STARTUP_OFFSET;
        let mut handle = SchedulerHandle {
            threads: Vec::with_capacity(self.periodic.len() + self.background.len()),
            running: running.clone(),
        };

        let priorities = assignment.into_iter().map(|(_, _, p)| p);
        for (task, prio) in self.periodic.into_iter().zip(priorities) {
            let name = task.name();
            let task_running = running.clone();
            let metrics = self.metrics.clone();
            let spawned = thread::Builder::new()
                .name(name.to_string())
                .spawn_with_priority(prio.thread_priority(), move |prio_result| {
                    prepare_thread(name, core, prio_result);
                    run_periodic(task, epoch, task_running, metrics);
                });
            handle.push(name, spawned, &running)?;
        }

        for task in self.background {
            let name = task.name();
            let task_running = running.clone();
            let spawned = thread::Builder::new()
                .name(name.to_string())
                .spawn_with_priority(Priority::BACKGROUND.thread_priority(), move |prio_result| {
                    prepare_thread(name, core, prio_result);
                    run_background(task, task_running);
                });
            handle.push(name, spawned, &running)?;
        }

        info!("[Scheduler] {} threads started", handle.threads.len());
        Ok(handle)
    }

    fn resolve_core(&self) -> Option<CoreId> {
        let index = self.pin_core?;
        let cores = core_affinity::get_core_ids().unwrap_or_default();
        let core = cores.get(index).copied();
        if core.is_none() {
            warn!("[Scheduler] core {} not available, threads left unpinned", index);
        }
        core
    }
}

fn prepare_thread(
    name: &'static str,
    core: Option<CoreId>,
    prio_result: std::result::Result<(), thread_priority::Error>,
) {
    if let Err(e) = prio_result {
        warn!("[{}] running without requested priority: {:?}", name, e);
    }
    if let Some(core_id) = core {
        if core_affinity::set_for_current(core_id) {
            debug!("[{}] pinned to core {:?}", name, core_id);
        } else {
            warn!("[{}] failed to pin to core {:?}", name, core_id);
        }
    }
}

/// Release loop: wait for the absolute release, run one job, book the timing.
fn run_periodic(
    mut task: Box<dyn PeriodicTask>,
    epoch: Instant,
    running: Arc<AtomicBool>,
    metrics: MetricsRecorder,
) {
    let name = task.name();
    let sleeper = SpinSleeper::new(SPIN_NS).with_spin_strategy(SpinStrategy::YieldThread);
    let mut clock = ReleaseClock::new(epoch, task.period());

    while running.load(Ordering::Acquire) {
        if let Some(wait) = clock.time_until_release(Instant::now()) {
            sleeper.sleep(wait);
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        let timing = clock.mark_released(Instant::now());
        if timing.late {
            debug!("[{}] late release, started {:?} after release", name, timing.jitter);
        }

        task.release();
        metrics.record(MetricEvent::release(name, &timing));
    }

    debug!("[{}] stopped.", name);
}

fn run_background(mut task: Box<dyn BackgroundTask>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Acquire) {
        task.step();
    }
    debug!("[{}] stopped.", task.name());
}

/// Running task threads. Dropping it does not stop them; call `stop` + `join`.
pub struct SchedulerHandle {
    threads: Vec<(&'static str, JoinHandle<()>)>,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    fn push(
        &mut self,
        name: &'static str,
        spawned: std::io::Result<JoinHandle<()>>,
        running: &AtomicBool,
    ) -> Result<()> {
        match spawned {
            Ok(h) => {
                self.threads.push((name, h));
                Ok(())
            }
            Err(source) => {
                // already-spawned tasks exit at their next release
                running.store(false, Ordering::Release);
                Err(SystemError::Spawn { task: name, source })
            }
        }
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.threads.iter().map(|(n, _)| *n).collect()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn join(self) {
        for (name, h) in self.threads {
            if h.join().is_err() {
                error!("[Scheduler] task `{}` panicked", name);
            }
        }
        info!("[Scheduler] all tasks joined");
    }
}
