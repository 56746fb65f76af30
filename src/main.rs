//! # Cruise Control RTS Entry Point
//!
//! Runs the cruise-control task set on host threads against a simulated lab
//! board, with a scripted driver working the pedals.
//!
//! ## Modes
//! - **With extra load:** single run; the load switches are set to a chosen
//!   value (0-255) and the 25 ms load generator burns `value × 100 µs` per period.
//! - **Without load:** single run of the plain task set.
//! - **Sweep:** virtual-time RM simulation over load values
//!   [0, 64, 128, 192, 224, 255], reporting misses and starved watchdog windows.
//!
//! `RUST_LOG=info` shows task start-up, driver actions and overload warnings;
//! `RUST_LOG=debug` adds the display output every 500 ms.

use std::{
    io::{BufRead, Write, stdin, stdout},
    sync::Arc,
};

use log::{error, info, warn};

use cruise_rts::{
    analysis::rm_sim::{self, SWEEP_LOADS},
    hal::{board::Board, driver::ScriptedDriver, sim_board::SimBoard},
    system::CruiseSystem,
    utils::{
        config::SystemConfig,
        metrics::{Metrics, calculate_stats, calculate_stats_u64},
    },
};

const DEFAULT_LOAD_VALUE: u8 = 128;
const DEFAULT_CORE: usize = 0;
const SWEEP_SECONDS: u64 = 10;

fn main() {
    env_logger::init();
    info!("=== CRUISE CONTROL RTS START ===");

    loop {
        // closed stdin reads as Exit
        let choice = prompt_menu().unwrap_or_else(|| "4".to_string());
        match choice.as_str() {
            "1" => {
                let load_value = prompt_load_value();
                let core = prompt_core_id();
                run_simulation(Some(load_value), core);
                println!("\n Run completed. Returning to menu...\n");
            }
            "2" | "" => {
                println!("Running without extra load.");
                run_simulation(None, Some(DEFAULT_CORE));
                println!("\n Run completed. Returning to menu...\n");
            }
            "3" => {
                println!("Running schedulability sweep over {:?}", SWEEP_LOADS);
                run_sweep(&SWEEP_LOADS);
                println!("\n Sweep completed. Returning to menu...\n");
            }
            "4" => {
                println!("Exiting. Goodbye!");
                info!("=== CRUISE CONTROL RTS FINISHED ===");
                return;
            }
            other => {
                println!("Unrecognized option '{}', please try again.", other);
            }
        }
    }
}

fn prompt_menu() -> Option<String> {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│     SELECT RUN MODE                         │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) WITH extra load (single run)            │");
    println!("│  2) NO extra load (single run)              │");
    println!("│  3) SCHEDULABILITY SWEEP (virtual time)     │");
    println!("│  4) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select [1/2/3/4] (default: 2): ");
    read_line()
}

fn prompt_load_value() -> u8 {
    print!("Enter load switch value 0-255 [default: {}]: ", DEFAULT_LOAD_VALUE);
    read_line()
        .and_then(|s| s.parse::<u8>().ok())
        .unwrap_or(DEFAULT_LOAD_VALUE)
}

/// Empty input keeps the default core; "none" leaves placement to the OS.
fn prompt_core_id() -> Option<usize> {
    print!("Enter core ID to pin all tasks, or 'none' [default: {}]: ", DEFAULT_CORE);
    let input = read_line().unwrap_or_default();
    if input.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(input.parse::<usize>().unwrap_or(DEFAULT_CORE))
}

/// `None` once stdin is closed or unreadable.
fn read_line() -> Option<String> {
    let _ = stdout().flush();
    read_trimmed(&mut stdin().lock())
}

fn read_trimmed<R: BufRead>(reader: &mut R) -> Option<String> {
    let mut input = String::new();
    match reader.read_line(&mut input) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(input.trim().to_string()),
    }
}

fn run_simulation(load_value: Option<u8>, core: Option<usize>) {
    let config = SystemConfig::default()
        .with_extra_load(load_value.is_some())
        .with_pin_core(core);
    let run = config.run_duration;

    let sim_board = Arc::new(SimBoard::new());
    if let Some(value) = load_value {
        sim_board.set_load_switches(value);
    }
    let board: Arc<dyn Board> = sim_board.clone();

    info!(
        "[Experiment] Starting: extra_load={:?}, core={:?}, duration={:?}",
        load_value, core, run
    );

    let system = match CruiseSystem::new(config, board).and_then(|s| s.start()) {
        Ok(system) => system,
        Err(e) => {
            error!("[Experiment] could not start: {}", e);
            return;
        }
    };

    let driver = ScriptedDriver::demo(system.run_duration()).spawn(sim_board, system.running());
    let metrics = system.run();
    if driver.join().is_err() {
        warn!("[Experiment] driver thread panicked");
    }

    log_summary(&metrics);
}

fn log_summary(m: &Metrics) {
    info!("==================== RUN SUMMARY ====================");
    for (name, stats) in &m.tasks {
        let jitter = calculate_stats_u64(&stats.jitter_us);
        info!(
            "{:<10} releases={:<5} late={:<4} jitter(us) mean={:.0} max={:.0}",
            name,
            stats.releases,
            stats.late_releases,
            jitter.as_ref().map_or(0.0, |s| s.mean),
            jitter.as_ref().map_or(0.0, |s| s.max),
        );
    }

    if let Some(v) = calculate_stats(&m.velocity) {
        info!("velocity  min={:.0} max={:.0} mean={:.1} (0.1 m/s, {} samples)", v.min, v.max, v.mean, v.count);
    }
    if let Some(t) = calculate_stats(&m.throttle) {
        info!("throttle  min={:.0} max={:.0} mean={:.1}", t.min, t.max, t.mean);
    }
    if let Some(p) = m.position.back() {
        info!("position  final={:.0} (0.1 m)", p);
    }

    info!(
        "watchdog  checks={} overload_warnings={} extra_load_value={}",
        m.watchdog_checks, m.overload_warnings, m.extra_load_value
    );
    if m.dropped_events > 0 {
        warn!("{} metric event(s) dropped on a full queue", m.dropped_events);
    }
    if m.overload_warnings > 0 {
        warn!("{} overload warning(s) during the run", m.overload_warnings);
    }
    info!("=====================================================");
}

fn run_sweep(loads: &[u8]) {
    let config = SystemConfig::default();
    let tasks = rm_sim::cruise_task_set(&config, 0);
    info!(
        "[SWEEP] base utilization={:.4}, Liu-Layland bound(n={})={:.4}",
        rm_sim::utilization(&tasks),
        tasks.len(),
        rm_sim::liu_layland_bound(tasks.len())
    );

    for (value, report) in rm_sim::sweep(&config, loads, SWEEP_SECONDS) {
        info!(
            "[SWEEP] load={:<3} U={:.3} missed={:<5} preemptions={:<6} idle={:<6} starved_windows={}/{}",
            value,
            report.utilization,
            report.total_missed(),
            report.preemptions,
            report.idle_ticks,
            report.starved_windows,
            report.watchdog_windows,
        );
        for t in &report.tasks {
            if t.missed > 0 {
                info!(
                    "[SWEEP]   {:<10} prio={} released={} completed={} missed={} worst_response={} ticks",
                    t.name, t.priority.0, t.released, t.completed, t.missed, t.worst_response
                );
            }
        }
    }
}
