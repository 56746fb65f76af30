//! system.rs
//! Wiring: channels, tasks and scheduler for one cruise-control run.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{info, warn};

use crate::cruise::control::{ControlLoop, ThrottlePolicy};
use crate::cruise::display::DisplayTask;
use crate::cruise::input::InputSampler;
use crate::cruise::signals::{SignalReaders, SignalSnapshot, signals};
use crate::cruise::vehicle::VehicleModel;
use crate::hal::board::Board;
use crate::rtos::scheduler::{PeriodicScheduler, SchedulerHandle};
use crate::supervision::load::{ExtraLoadGenerator, LoadFeeder};
use crate::supervision::watchdog::{WatchdogMonitor, feed_line};
use crate::utils::config::SystemConfig;
use crate::utils::error::Result;
use crate::utils::metrics::{Metrics, MetricsRecorder};

/// How often queued metric events are folded into the shared view.
const METRICS_COLLECT_INTERVAL: Duration = Duration::from_millis(100);

/// Every task of the system, wired to its channels but not yet scheduled.
/// Tests drive these directly in virtual time.
pub struct CruiseTasks {
    pub input: InputSampler,
    pub vehicle: VehicleModel,
    pub control: ControlLoop,
    pub display: DisplayTask,
    pub watchdog: WatchdogMonitor,
    pub feeder: LoadFeeder,
    pub extra_load: Option<ExtraLoadGenerator>,
    pub signals: SignalReaders,
}

impl CruiseTasks {
    pub fn new(config: &SystemConfig, board: Arc<dyn Board>, metrics: MetricsRecorder) -> Result<Self> {
        config.validate()?;
        let periods = &config.periods;
        let (w, readers) = signals();
        let (feed_tx, feed_rx) = feed_line();

        let input = InputSampler::new(
            board.clone(),
            periods.input,
            w.gas,
            w.brake,
            w.cruise,
            w.target_velocity,
            readers.velocity.clone(),
        );
        let vehicle = VehicleModel::new(
            periods.vehicle,
            config.brake_retardation,
            readers.throttle.clone(),
            readers.brake.clone(),
            w.velocity,
            w.position,
            metrics.clone(),
        );
        let control = ControlLoop::new(
            periods.control,
            readers.gas.clone(),
            readers.brake.clone(),
            readers.cruise.clone(),
            readers.target_velocity.clone(),
            readers.velocity.clone(),
            w.throttle,
            ThrottlePolicy::new(config.gains, config.gas_step),
            metrics.clone(),
        );
        let display = DisplayTask::new(board.clone(), periods.display, readers.clone());
        let watchdog = WatchdogMonitor::new(periods.watchdog, feed_rx, metrics.clone());
        let feeder = LoadFeeder::new(feed_tx);
        let extra_load = config
            .extra_load
            .then(|| ExtraLoadGenerator::new(board, periods.extra_load, metrics));

        Ok(Self {
            input,
            vehicle,
            control,
            display,
            watchdog,
            feeder,
            extra_load,
            signals: readers,
        })
    }
}

/// A validated configuration bound to a board, ready to start.
pub struct CruiseSystem {
    config: SystemConfig,
    board: Arc<dyn Board>,
    metrics: MetricsRecorder,
}

impl CruiseSystem {
    pub fn new(config: SystemConfig, board: Arc<dyn Board>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            board,
            metrics: MetricsRecorder::new(),
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsRecorder {
        self.metrics.clone()
    }

    pub fn start(self) -> Result<RunningSystem> {
        let tasks = CruiseTasks::new(&self.config, self.board, self.metrics.clone())?;
        let signals = tasks.signals.clone();

        let mut scheduler = PeriodicScheduler::new(self.config.pin_core, self.metrics.clone());
        scheduler
            .add_periodic(tasks.watchdog)
            .add_periodic(tasks.input)
            .add_periodic(tasks.vehicle)
            .add_periodic(tasks.control)
            .add_periodic(tasks.display)
            .add_background(tasks.feeder);
        if let Some(extra) = tasks.extra_load {
            scheduler.add_periodic(extra);
        }

        let running = Arc::new(AtomicBool::new(true));
        let handle = scheduler.start(running.clone())?;
        let collector = self.metrics.start_collector(running.clone(), METRICS_COLLECT_INTERVAL);
        info!(
            "[System] started: {} (extra load {})",
            handle.task_names().join(", "),
            if self.config.extra_load { "on" } else { "off" }
        );

        Ok(RunningSystem {
            handle,
            signals,
            metrics: self.metrics,
            collector,
            running,
            run_duration: self.config.run_duration,
        })
    }
}

pub struct RunningSystem {
    handle: SchedulerHandle,
    signals: SignalReaders,
    metrics: MetricsRecorder,
    collector: JoinHandle<()>,
    running: Arc<AtomicBool>,
    run_duration: Duration,
}

impl RunningSystem {
    pub fn snapshot(&self) -> SignalSnapshot {
        self.signals.snapshot()
    }

    pub fn metrics(&self) -> MetricsRecorder {
        self.metrics.clone()
    }

    /// Configured length of a [`run`](Self::run).
    pub fn run_duration(&self) -> Duration {
        self.run_duration
    }

    /// Shared with anything that should stop together with the tasks.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Stop, join every task and return the collected metrics.
    pub fn shutdown(self) -> Metrics {
        self.handle.stop();
        self.handle.join();
        if self.collector.join().is_err() {
            warn!("[System] metrics collector panicked");
        }
        self.metrics.snapshot()
    }

    /// Run for the configured `run_duration`, then shut down.
    pub fn run(self) -> Metrics {
        let duration = self.run_duration;
        self.run_for(duration)
    }

    /// Let the system run for `duration`, then shut it down.
    pub fn run_for(self, duration: Duration) -> Metrics {
        thread::sleep(duration);
        self.shutdown()
    }
}
