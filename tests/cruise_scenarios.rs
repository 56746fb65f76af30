//! End-to-end cruise scenarios.
//!
//! Most tests drive the tasks in lockstep virtual time: every 50 ms step the
//! due tasks are released in rate-monotonic order. The last tests run the real
//! threaded scheduler for a short time.

use std::{sync::Arc, time::Duration};

use cruise_rts::{
    cruise::vehicle::TRACK_LENGTH,
    hal::{
        board::{Board, Input, Led},
        sim_board::SimBoard,
    },
    rtos::scheduler::PeriodicTask,
    system::{CruiseSystem, CruiseTasks},
    utils::{
        config::{SystemConfig, TaskPeriods},
        error::SystemError,
        metrics::MetricsRecorder,
    },
};

const STEP_MS: u64 = 50;

struct Rig {
    board: Arc<SimBoard>,
    tasks: CruiseTasks,
    now_ms: u64,
}

impl Rig {
    fn new() -> Self {
        let board = Arc::new(SimBoard::new());
        let dyn_board: Arc<dyn Board> = board.clone();
        let tasks = CruiseTasks::new(&SystemConfig::default(), dyn_board, MetricsRecorder::new()).unwrap();
        Self { board, tasks, now_ms: 0 }
    }

    /// Advance `ms` of virtual time with the default periods.
    fn run(&mut self, ms: u64) {
        let end = self.now_ms + ms;
        while self.now_ms < end {
            let t = self.now_ms;
            if t % 50 == 0 {
                self.tasks.input.release();
            }
            if t % 100 == 0 {
                self.tasks.vehicle.release();
            }
            if t % 200 == 0 {
                self.tasks.control.release();
            }
            if t % 500 == 0 {
                self.tasks.display.release();
            }
            self.now_ms += STEP_MS;
        }
    }

    fn velocity(&self) -> i32 {
        self.tasks.signals.velocity.get(0)
    }

    fn throttle(&self) -> i32 {
        self.tasks.signals.throttle.get(0)
    }

    /// Hold the cruise switch for one input period.
    fn tap_cruise(&mut self) {
        self.board.press(Input::CruiseToggle);
        self.run(STEP_MS);
        self.board.release(Input::CruiseToggle);
    }
}

#[test]
fn holding_gas_ramps_throttle_by_step_per_control_period() {
    let mut rig = Rig::new();
    rig.board.press(Input::GasPedal);

    // control released at 0, 200, ..., 1800
    rig.run(2_000);
    assert_eq!(rig.throttle(), 20);

    rig.run(10_000);
    assert_eq!(rig.throttle(), 80);
    assert!(rig.velocity() > 0);
}

#[test]
fn brake_cuts_throttle_within_one_control_period_and_stops_the_car() {
    let mut rig = Rig::new();
    rig.board.press(Input::GasPedal);
    rig.run(6_000);
    assert!(rig.velocity() > 0);

    rig.board.press(Input::BrakePedal);
    rig.run(200);
    assert_eq!(rig.throttle(), 0);

    rig.run(10_000);
    assert_eq!(rig.velocity(), 0);
    assert!(rig.board.led(Led::Red));
}

#[test]
fn cruise_holds_the_captured_velocity() {
    let mut rig = Rig::new();
    rig.board.press(Input::GasPedal);
    rig.run(10_000);
    rig.board.release(Input::GasPedal);

    let before = rig.velocity();
    rig.tap_cruise();
    let snap = rig.tasks.signals.snapshot();
    assert!(snap.cruise);
    assert_eq!(snap.target_velocity, before);

    rig.run(10_000);
    for _ in 0..100 {
        rig.run(500);
        let v = rig.velocity();
        assert!((v - snap.target_velocity).abs() <= 10, "drifted to {} from {}", v, snap.target_velocity);
    }
    assert!(rig.board.led(Led::Yellow));
}

#[test]
fn cruise_engaged_at_standstill_stays_idle() {
    let mut rig = Rig::new();
    rig.tap_cruise();
    assert!(rig.tasks.signals.cruise.get(false));
    assert_eq!(rig.tasks.signals.target_velocity.get(-1), 0);

    rig.run(2_000);
    assert_eq!(rig.throttle(), 0);
    assert_eq!(rig.velocity(), 0);
}

#[test]
fn brake_disengages_cruise() {
    let mut rig = Rig::new();
    rig.board.press(Input::GasPedal);
    rig.run(5_000);
    rig.board.release(Input::GasPedal);
    rig.tap_cruise();
    assert!(rig.tasks.signals.cruise.get(false));

    rig.board.press(Input::BrakePedal);
    rig.run(STEP_MS);
    rig.board.release(Input::BrakePedal);
    rig.run(1_000);
    assert!(!rig.tasks.signals.cruise.get(true));
    assert_eq!(rig.throttle(), 0);
}

#[test]
fn long_drive_stays_on_the_track() {
    let mut rig = Rig::new();
    rig.board.press(Input::GasPedal);
    for _ in 0..400 {
        rig.run(500);
        let p = rig.tasks.signals.position.get(-1);
        assert!((0..TRACK_LENGTH).contains(&p), "position {} off track", p);
        assert!(rig.board.lit_bar_led().is_some());
    }
    // several laps at full throttle
    assert!(rig.velocity() > 400);
}

#[test]
fn extra_load_task_only_when_configured() {
    let board: Arc<dyn Board> = Arc::new(SimBoard::new());
    let plain = CruiseTasks::new(&SystemConfig::default(), board.clone(), MetricsRecorder::new()).unwrap();
    assert!(plain.extra_load.is_none());

    let loaded = CruiseTasks::new(
        &SystemConfig::default().with_extra_load(true),
        board,
        MetricsRecorder::new(),
    )
    .unwrap();
    assert!(loaded.extra_load.is_some());
}

#[test]
fn invalid_config_is_rejected_before_start() {
    let mut config = SystemConfig::default();
    config.periods.control = Duration::ZERO;
    let err = CruiseSystem::new(config, Arc::new(SimBoard::new())).err();
    assert!(matches!(err, Some(SystemError::ZeroPeriod { task: "control" })));
}

fn fast_config() -> SystemConfig {
    let periods = TaskPeriods {
        input: Duration::from_millis(5),
        vehicle: Duration::from_millis(10),
        control: Duration::from_millis(20),
        display: Duration::from_millis(50),
        watchdog: Duration::from_millis(100),
        extra_load: Duration::from_millis(5),
    };
    SystemConfig { periods, ..SystemConfig::default() }
        .with_pin_core(None)
        .with_run_duration(Duration::from_millis(600))
}

#[test]
fn threaded_run_releases_every_task_and_applies_gas() {
    let board = Arc::new(SimBoard::new());
    board.press(Input::GasPedal);
    let config = fast_config();
    let run = config.run_duration;

    let system = CruiseSystem::new(config, board.clone()).unwrap().start().unwrap();
    std::thread::sleep(run);
    assert!(system.snapshot().gas);
    system.stop();
    assert!(!system.is_running());
    let metrics = system.shutdown();

    for name in ["input", "vehicle", "control", "display", "watchdog"] {
        let releases = metrics.tasks.get(name).map_or(0, |s| s.releases);
        assert!(releases > 0, "{} never released", name);
    }
    assert!(!metrics.tasks.contains_key("extra_load"));
    assert!(metrics.watchdog_checks >= 1);
    assert!(metrics.throttle.iter().any(|&t| t > 0.0));
    assert!(board.led(Led::Green));
}

#[test]
fn threaded_run_with_extra_load_records_switch_value() {
    let board = Arc::new(SimBoard::new());
    board.set_load_switches(10);
    let config = fast_config().with_extra_load(true);
    let run = config.run_duration;

    let system = CruiseSystem::new(config, board).unwrap().start().unwrap();
    let shared = system.metrics();
    let metrics = system.run_for(run);

    assert!(metrics.tasks["extra_load"].releases > 0);
    assert_eq!(metrics.extra_load_value, 10);
    assert_eq!(shared.snapshot().extra_load_value, 10);
    assert_eq!(metrics.dropped_events, 0);
}

#[test]
fn run_lasts_the_configured_duration() {
    let config = fast_config().with_run_duration(Duration::from_millis(300));
    let system = CruiseSystem::new(config, Arc::new(SimBoard::new())).unwrap().start().unwrap();
    assert_eq!(system.run_duration(), Duration::from_millis(300));

    let started = std::time::Instant::now();
    let metrics = system.run();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "stopped after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "ran for {:?}", elapsed);
    assert!(metrics.tasks["input"].releases > 0);
}
