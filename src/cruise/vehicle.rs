//! vehicle.rs
//! Vehicle task: integrates throttle and brake into velocity and position.
//!
//! Units follow the lab kit: velocity in 0.1 m/s, position in 0.1 m on a
//! 2400 m circular track, acceleration in 0.1 m/s^2, time in ms. All integer
//! arithmetic is signed and truncates toward zero.

use std::time::Duration;

use log::trace;

use crate::rtos::channel::{StateReader, StateWriter};
use crate::rtos::scheduler::PeriodicTask;
use crate::utils::metrics::{MetricEvent, MetricsRecorder};

pub const TRACK_LENGTH: i32 = 24_000;
pub const VELOCITY_MIN: i32 = -200;
pub const VELOCITY_MAX: i32 = 700;

const TERRAIN_BAND: i32 = 4_000;
/// flat, uphill, steep uphill, flat, downhill, steep downhill
const TERRAIN_OFFSETS: [i32; 6] = [0, 8, 16, 0, -8, -16];

/// Air resistance; depends on speed magnitude only.
pub fn wind_factor(velocity: i32) -> i32 {
    let v = i64::from(velocity);
    (v * v / 10_000 + 1) as i32
}

pub fn terrain_offset(position: i32) -> i32 {
    let band = (position.rem_euclid(TRACK_LENGTH) / TERRAIN_BAND) as usize;
    TERRAIN_OFFSETS[band.min(TERRAIN_OFFSETS.len() - 1)]
}

pub fn retardation(position: i32, velocity: i32) -> i32 {
    wind_factor(velocity) + terrain_offset(position)
}

/// `position + v·dt/1000 + a/2·(dt/1000)²`, wrapped onto the track.
/// With dt in whole ms the acceleration term only contributes once dt ≥ 1000.
pub fn adjust_position(position: i32, velocity: i32, acceleration: i32, dt_ms: u64) -> i32 {
    let dt = dt_ms as i64;
    let dt_s = dt / 1000;
    let raw = i64::from(position)
        + i64::from(velocity) * dt / 1000
        + i64::from(acceleration) / 2 * dt_s * dt_s;
    raw.rem_euclid(i64::from(TRACK_LENGTH)) as i32
}

/// Without brake: `v + a·dt/1000`, floored at 0. With brake: a fixed
/// deceleration, stopping at 0 instead of going negative. Capped at
/// [`VELOCITY_MAX`] either way.
pub fn adjust_velocity(
    velocity: i32,
    acceleration: i32,
    brake: bool,
    dt_ms: u64,
    brake_retardation: i32,
) -> i32 {
    let dt = dt_ms as i64;
    let v = i64::from(velocity);
    let next = if !brake {
        (v + i64::from(acceleration) * dt / 1000).max(0)
    } else {
        let decel = i64::from(brake_retardation) * dt / 1000;
        if decel > v { 0 } else { v - decel }
    };
    next.min(i64::from(VELOCITY_MAX)) as i32
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VehicleState {
    pub position: i32,
    pub velocity: i32,
}

/// Pure kinematic model, advanced once per vehicle period.
#[derive(Debug, Clone)]
pub struct Kinematics {
    dt_ms: u64,
    brake_retardation: i32,
    state: VehicleState,
}

impl Kinematics {
    pub fn new(period: Duration, brake_retardation: i32) -> Self {
        Self {
            dt_ms: period.as_millis() as u64,
            brake_retardation,
            state: VehicleState::default(),
        }
    }

    pub fn with_state(mut self, state: VehicleState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// Position advances with the old velocity, then velocity is updated.
    pub fn advance(&mut self, throttle: i32, brake: bool) -> VehicleState {
        let VehicleState { position, velocity } = self.state;
        let acceleration = throttle / 2 - retardation(position, velocity);

        self.state = VehicleState {
            position: adjust_position(position, velocity, acceleration, self.dt_ms),
            velocity: adjust_velocity(
                velocity,
                acceleration,
                brake,
                self.dt_ms,
                self.brake_retardation,
            ),
        };
        self.state
    }
}

pub struct VehicleModel {
    period: Duration,
    throttle: StateReader<i32>,
    brake: StateReader<bool>,
    velocity: StateWriter<i32>,
    position: StateWriter<i32>,
    kinematics: Kinematics,
    metrics: MetricsRecorder,
}

impl VehicleModel {
    pub fn new(
        period: Duration,
        brake_retardation: i32,
        throttle: StateReader<i32>,
        brake: StateReader<bool>,
        velocity: StateWriter<i32>,
        position: StateWriter<i32>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            period,
            throttle,
            brake,
            velocity,
            position,
            kinematics: Kinematics::new(period, brake_retardation),
            metrics,
        }
    }

    pub fn step(&mut self) -> VehicleState {
        let throttle = self.throttle.get(0);
        let brake = self.brake.get(false);
        let state = self.kinematics.advance(throttle, brake);

        self.velocity.put(state.velocity);
        self.position.put(state.position);
        trace!("[Vehicle] throttle={} brake={} -> {:?}", throttle, brake, state);

        self.metrics.record(MetricEvent::Vehicle {
            velocity: state.velocity,
            position: state.position,
        });
        state
    }
}

impl PeriodicTask for VehicleModel {
    fn name(&self) -> &'static str {
        "vehicle"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.step();
    }
}
