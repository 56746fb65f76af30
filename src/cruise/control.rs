//! control.rs
//! Control task: turns pedal/cruise state and velocity into a throttle value.
//!
//! Precedence each period:
//! 1. brake pressed  -> 0
//! 2. gas pressed    -> previous throttle + GAS_STEP, saturating at 80
//! 3. cruise enabled -> integer PID on target vs. current velocity
//! 4. otherwise      -> 0
//!
//! The PID state lives inside the task value; nothing else can reach it.

use std::time::Duration;

use log::debug;

use crate::rtos::channel::{StateReader, StateWriter};
use crate::rtos::scheduler::PeriodicTask;
use crate::utils::config::{PidGains, THROTTLE_MAX};
use crate::utils::metrics::{MetricEvent, MetricsRecorder};

pub const THROTTLE_MIN: i32 = 0;

/// Integrator and last error, carried from one control period to the next.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PidState {
    pub integral: i32,
    pub prev_error: i16,
}

/// Integer PID with output clamped to the throttle range. The integral only
/// saturates at the i32 limits; the output clamp is the sole anti-windup.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    state: PidState,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
        }
    }

    pub fn state(&self) -> PidState {
        self.state
    }

    pub fn compute(&mut self, target_velocity: i32, velocity: i32) -> i32 {
        let error = to_i16(target_velocity.saturating_sub(velocity));
        self.state.integral = self.state.integral.saturating_add(i32::from(error));
        let derivative = i32::from(error) - i32::from(self.state.prev_error);
        self.state.prev_error = error;

        let output = i64::from(self.gains.kp) * i64::from(error)
            + i64::from(self.gains.ki) * i64::from(self.state.integral)
            + i64::from(self.gains.kd) * i64::from(derivative);

        output.clamp(i64::from(THROTTLE_MIN), i64::from(THROTTLE_MAX)) as i32
    }
}

fn to_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// One period's view of the channels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlInputs {
    pub gas: bool,
    pub brake: bool,
    pub cruise: bool,
    pub target_velocity: i32,
    pub velocity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleSource {
    Brake,
    Gas,
    Cruise,
    Idle,
}

/// Throttle decision with the PID and the previous throttle as the only state.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    pid: PidController,
    gas_step: i32,
    throttle: i32,
}

impl ThrottlePolicy {
    pub fn new(gains: PidGains, gas_step: i32) -> Self {
        Self {
            pid: PidController::new(gains),
            gas_step,
            throttle: 0,
        }
    }

    pub fn throttle(&self) -> i32 {
        self.throttle
    }

    pub fn pid_state(&self) -> PidState {
        self.pid.state()
    }

    pub fn decide(&mut self, inputs: &ControlInputs) -> (i32, ThrottleSource) {
        let (throttle, source) = if inputs.brake {
            (0, ThrottleSource::Brake)
        } else if inputs.gas {
            (
                (self.throttle + self.gas_step).min(THROTTLE_MAX),
                ThrottleSource::Gas,
            )
        } else if inputs.cruise {
            (
                self.pid.compute(inputs.target_velocity, inputs.velocity),
                ThrottleSource::Cruise,
            )
        } else {
            (0, ThrottleSource::Idle)
        };
        self.throttle = throttle;
        (throttle, source)
    }
}

pub struct ControlLoop {
    period: Duration,
    gas: StateReader<bool>,
    brake: StateReader<bool>,
    cruise: StateReader<bool>,
    target_velocity: StateReader<i32>,
    velocity: StateReader<i32>,
    throttle: StateWriter<i32>,
    policy: ThrottlePolicy,
    metrics: MetricsRecorder,
}

impl ControlLoop {
    pub fn new(
        period: Duration,
        gas: StateReader<bool>,
        brake: StateReader<bool>,
        cruise: StateReader<bool>,
        target_velocity: StateReader<i32>,
        velocity: StateReader<i32>,
        throttle: StateWriter<i32>,
        policy: ThrottlePolicy,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            period,
            gas,
            brake,
            cruise,
            target_velocity,
            velocity,
            throttle,
            policy,
            metrics,
        }
    }

    fn read_inputs(&self) -> ControlInputs {
        ControlInputs {
            gas: self.gas.get(false),
            brake: self.brake.get(false),
            cruise: self.cruise.get(false),
            target_velocity: self.target_velocity.get(0),
            velocity: self.velocity.get(0),
        }
    }

    pub fn step(&mut self) -> i32 {
        let inputs = self.read_inputs();
        let (throttle, source) = self.policy.decide(&inputs);
        self.throttle.put(throttle);
        debug!("[Control] {:?} throttle={} v={}", source, throttle, inputs.velocity);

        self.metrics.record(MetricEvent::Throttle(throttle));
        throttle
    }

    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }
}

impl PeriodicTask for ControlLoop {
    fn name(&self) -> &'static str {
        "control"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.step();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtos::channel::state_channel;
    use crate::utils::config::GAS_STEP;

    fn policy() -> ThrottlePolicy {
        ThrottlePolicy::new(PidGains::default(), GAS_STEP)
    }

    fn gas() -> ControlInputs {
        ControlInputs { gas: true, ..Default::default() }
    }

    #[test]
    fn first_cruise_cycle_saturates() {
        // 100*100 + 1*100 + 5*100 = 10600, clamped to 80
        let mut pid = PidController::new(PidGains::default());
        assert_eq!(pid.compute(100, 0), 80);
        assert_eq!(pid.state(), PidState { integral: 100, prev_error: 100 });
    }

    #[test]
    fn pid_output_stays_in_throttle_range() {
        let mut pid = PidController::new(PidGains::default());
        for (target, velocity) in [(700, -200), (-200, 700), (0, 0), (350, 349), (i32::MAX, i32::MIN)] {
            let out = pid.compute(target, velocity);
            assert!((0..=80).contains(&out), "out of range: {}", out);
        }
    }

    #[test]
    fn overspeed_gives_zero_throttle() {
        let mut pid = PidController::new(PidGains::default());
        assert_eq!(pid.compute(300, 400), 0);
    }

    #[test]
    fn integral_persists_across_cycles() {
        let mut pid = PidController::new(PidGains::default());
        pid.compute(110, 100);
        pid.compute(110, 105);
        let s = pid.state();
        assert_eq!(s.integral, 15);
        assert_eq!(s.prev_error, 5);
    }

    #[test]
    fn small_error_gives_proportional_throttle() {
        let mut pid = PidController::new(PidGains { kp: 10, ki: 0, kd: 0 });
        assert_eq!(pid.compute(103, 100), 30);
    }

    #[test]
    fn gas_ramps_by_step_until_saturation() {
        let mut p = policy();
        let mut expected = 0;
        for _ in 0..60 {
            let (t, src) = p.decide(&gas());
            expected = (expected + GAS_STEP).min(THROTTLE_MAX);
            assert_eq!(t, expected);
            assert_eq!(src, ThrottleSource::Gas);
        }
        assert_eq!(p.throttle(), 80);
    }

    #[test]
    fn brake_beats_gas() {
        let mut p = policy();
        for _ in 0..10 {
            p.decide(&gas());
        }
        let (t, src) = p.decide(&ControlInputs { gas: true, brake: true, ..Default::default() });
        assert_eq!(t, 0);
        assert_eq!(src, ThrottleSource::Brake);
    }

    #[test]
    fn gas_ramp_restarts_from_zero_after_brake() {
        let mut p = policy();
        p.decide(&gas());
        p.decide(&gas());
        p.decide(&ControlInputs { brake: true, ..Default::default() });
        assert_eq!(p.decide(&gas()).0, GAS_STEP);
    }

    #[test]
    fn gas_overrides_cruise() {
        let mut p = policy();
        let (t, src) = p.decide(&ControlInputs {
            gas: true,
            cruise: true,
            target_velocity: 100,
            ..Default::default()
        });
        assert_eq!((t, src), (GAS_STEP, ThrottleSource::Gas));
        assert_eq!(p.pid_state(), PidState::default());
    }

    #[test]
    fn nothing_pressed_is_idle() {
        let mut p = policy();
        p.decide(&gas());
        assert_eq!(p.decide(&ControlInputs::default()), (0, ThrottleSource::Idle));
    }

    #[test]
    fn control_loop_reads_channels_and_publishes_throttle() {
        let (gas_tx, gas_rx) = state_channel();
        let (_brake_tx, brake_rx) = state_channel();
        let (cruise_tx, cruise_rx) = state_channel();
        let (target_tx, target_rx) = state_channel();
        let (velocity_tx, velocity_rx) = state_channel();
        let (throttle_tx, throttle_rx) = state_channel();
        let metrics = MetricsRecorder::new();

        let mut ctl = ControlLoop::new(
            Duration::from_millis(200),
            gas_rx,
            brake_rx,
            cruise_rx,
            target_rx,
            velocity_rx,
            throttle_tx,
            policy(),
            metrics.clone(),
        );

        // startup: nothing published yet, defaults apply
        ctl.release();
        assert_eq!(throttle_rx.get(-1), 0);

        gas_tx.put(false);
        cruise_tx.put(true);
        target_tx.put(100);
        velocity_tx.put(0);
        ctl.release();
        assert_eq!(throttle_rx.get(-1), 80);
        assert_eq!(metrics.snapshot().throttle.len(), 2);
    }
}
