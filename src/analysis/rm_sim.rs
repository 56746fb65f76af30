//! rm_sim.rs
//! Schedulability analysis for the cruise task set.
//!
//! Two views of the same question, "does the feeder still get CPU time?":
//! - Liu & Layland utilization bound `n(2^(1/n) − 1)`, a sufficient test
//! - A virtual-time simulation of preemptive rate-monotonic scheduling on one
//!   core, stepping in ticks of 100 µs
//!
//! The simulation is deterministic and independent of host thread timing, so
//! it answers for the modeled CPU what the threaded run can only approximate.

use std::{collections::VecDeque, time::Duration};

use crate::rtos::scheduler::{Priority, assign_priorities};
use crate::supervision::load::LOAD_UNIT;
use crate::utils::config::SystemConfig;

/// One simulation tick; equal to one unit of extra load.
pub const TICK: Duration = LOAD_UNIT;

/// Estimated execution cost of each cruise task, in ticks.
const INPUT_COST: u32 = 1;
const VEHICLE_COST: u32 = 1;
const CONTROL_COST: u32 = 1;
const DISPLAY_COST: u32 = 2;
const WATCHDOG_COST: u32 = 1;

/// Load values the binary's sweep mode runs through.
pub const SWEEP_LOADS: [u8; 6] = [0, 64, 128, 192, 224, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimTask {
    pub name: &'static str,
    /// Ticks between releases; must be non-zero.
    pub period: u32,
    /// Ticks of CPU per job.
    pub cost: u32,
    pub supervisor: bool,
}

impl SimTask {
    pub fn new(name: &'static str, period: u32, cost: u32) -> Self {
        Self { name, period, cost, supervisor: false }
    }

    pub fn supervisor(name: &'static str, period: u32, cost: u32) -> Self {
        Self { name, period, cost, supervisor: true }
    }

    pub fn utilization(&self) -> f64 {
        self.cost as f64 / self.period as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: &'static str,
    pub priority: Priority,
    pub released: u64,
    pub completed: u64,
    /// Releases that found the previous job still unfinished.
    pub missed: u64,
    /// Worst release-to-completion time, in ticks.
    pub worst_response: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    pub tasks: Vec<TaskOutcome>,
    pub preemptions: u64,
    /// Ticks in which no periodic job was ready; the background feeder runs here.
    pub idle_ticks: u64,
    pub watchdog_windows: u64,
    /// Windows with zero idle ticks: the watchdog would report an overload.
    pub starved_windows: u64,
    pub utilization: f64,
}

impl SimReport {
    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn total_missed(&self) -> u64 {
        self.tasks.iter().map(|t| t.missed).sum()
    }

    pub fn schedulable(&self) -> bool {
        self.total_missed() == 0
    }
}

pub fn utilization(tasks: &[SimTask]) -> f64 {
    tasks.iter().map(SimTask::utilization).sum()
}

/// `n(2^(1/n) − 1)`; 0.0 for an empty set.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Sufficient (not necessary) rate-monotonic test.
pub fn passes_liu_layland(tasks: &[SimTask]) -> bool {
    utilization(tasks) <= liu_layland_bound(tasks.len())
}

pub fn to_ticks(d: Duration) -> u32 {
    u32::try_from(d.as_micros() / TICK.as_micros()).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy)]
struct Job {
    released_at: u64,
    remaining: u32,
}

/// Run `horizon` ticks of preemptive fixed-priority scheduling with the same
/// priority assignment as the threaded scheduler. Equal priorities run in
/// registration order.
/// All tasks release at tick 0. Tasks with a zero period are ignored.
pub fn simulate(tasks: &[SimTask], horizon: u64, watchdog_window: u64) -> SimReport {
    let tasks: Vec<SimTask> = tasks.iter().copied().filter(|t| t.period > 0).collect();
    let periods: Vec<Duration> = tasks.iter().map(|t| TICK * t.period).collect();
    let supervisor: Vec<bool> = tasks.iter().map(|t| t.supervisor).collect();
    let priorities = assign_priorities(&periods, &supervisor);

    // highest priority first, stable for ties
    let mut order: Vec<usize> = (0..tasks.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(priorities[i]));

    let mut queues: Vec<VecDeque<Job>> = vec![VecDeque::new(); tasks.len()];
    let mut outcomes: Vec<TaskOutcome> = tasks
        .iter()
        .zip(&priorities)
        .map(|(t, &priority)| TaskOutcome {
            name: t.name,
            priority,
            released: 0,
            completed: 0,
            missed: 0,
            worst_response: 0,
        })
        .collect();

    let mut preemptions = 0;
    let mut idle_ticks = 0;
    let mut watchdog_windows = 0;
    let mut starved_windows = 0;
    let mut fed_this_window = false;
    let mut last_running: Option<usize> = None;

    for tick in 0..horizon {
        for (i, task) in tasks.iter().enumerate() {
            if tick % u64::from(task.period) != 0 {
                continue;
            }
            let out = &mut outcomes[i];
            out.released += 1;
            if !queues[i].is_empty() {
                out.missed += 1;
            }
            if task.cost == 0 {
                out.completed += 1;
            } else {
                queues[i].push_back(Job { released_at: tick, remaining: task.cost });
            }
        }

        let running = order.iter().copied().find(|&i| !queues[i].is_empty());
        match running {
            Some(i) => {
                if let Some(prev) = last_running {
                    if prev != i && !queues[prev].is_empty() {
                        preemptions += 1;
                    }
                }
                if let Some(job) = queues[i].front_mut() {
                    job.remaining -= 1;
                    if job.remaining == 0 {
                        let response = (tick + 1 - job.released_at) as u32;
                        queues[i].pop_front();
                        let out = &mut outcomes[i];
                        out.completed += 1;
                        out.worst_response = out.worst_response.max(response);
                    }
                }
            }
            None => {
                idle_ticks += 1;
                fed_this_window = true;
            }
        }
        last_running = running;

        if watchdog_window > 0 && (tick + 1) % watchdog_window == 0 {
            watchdog_windows += 1;
            if !fed_this_window {
                starved_windows += 1;
            }
            fed_this_window = false;
        }
    }

    SimReport {
        tasks: outcomes,
        preemptions,
        idle_ticks,
        watchdog_windows,
        starved_windows,
        utilization: utilization(&tasks),
    }
}

/// The cruise task set with estimated costs, plus the extra-load task at
/// `load_value` ticks per job.
pub fn cruise_task_set(config: &SystemConfig, load_value: u8) -> Vec<SimTask> {
    let p = &config.periods;
    vec![
        SimTask::supervisor("watchdog", to_ticks(p.watchdog), WATCHDOG_COST),
        SimTask::new("extra_load", to_ticks(p.extra_load), u32::from(load_value)),
        SimTask::new("input", to_ticks(p.input), INPUT_COST),
        SimTask::new("vehicle", to_ticks(p.vehicle), VEHICLE_COST),
        SimTask::new("control", to_ticks(p.control), CONTROL_COST),
        SimTask::new("display", to_ticks(p.display), DISPLAY_COST),
    ]
}

/// Simulate `seconds` of the cruise set at each load value.
pub fn sweep(config: &SystemConfig, loads: &[u8], seconds: u64) -> Vec<(u8, SimReport)> {
    let ticks_per_sec = u64::from(to_ticks(Duration::from_secs(1)));
    let window = u64::from(to_ticks(config.periods.watchdog));
    loads
        .iter()
        .map(|&v| {
            let set = cruise_task_set(config, v);
            (v, simulate(&set, seconds * ticks_per_sec, window))
        })
        .collect()
}
