//! input.rs
//! Button task: samples the pedals and the cruise toggle every period and
//! publishes gas / brake / cruise / target velocity.
//!
//! - All buttons are active-low (pressed = low level)
//! - Cruise toggles on a falling edge of SW6 only; holding it does nothing
//! - Enabling cruise captures the current velocity sample as the target
//! - A pressed brake always switches cruise off

use std::{sync::Arc, time::Duration};

use log::{debug, info};

use crate::hal::board::{Board, Input};
use crate::rtos::channel::{StateReader, StateWriter};
use crate::rtos::scheduler::PeriodicTask;

/// Values published by one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSample {
    pub gas: bool,
    pub brake: bool,
    pub cruise: bool,
    pub target_velocity: i32,
}

pub struct InputSampler {
    board: Arc<dyn Board>,
    period: Duration,
    gas: StateWriter<bool>,
    brake: StateWriter<bool>,
    cruise: StateWriter<bool>,
    target_velocity: StateWriter<i32>,
    velocity: StateReader<i32>,
    prev_toggle_level: bool,
    cruise_enabled: bool,
    target: i32,
}

impl InputSampler {
    /// The toggle's current level becomes the edge detector's starting point,
    /// so a switch already held at start-up does not count as an edge.
    pub fn new(
        board: Arc<dyn Board>,
        period: Duration,
        gas: StateWriter<bool>,
        brake: StateWriter<bool>,
        cruise: StateWriter<bool>,
        target_velocity: StateWriter<i32>,
        velocity: StateReader<i32>,
    ) -> Self {
        let prev_toggle_level = board.read_input(Input::CruiseToggle);
        Self {
            board,
            period,
            gas,
            brake,
            cruise,
            target_velocity,
            velocity,
            prev_toggle_level,
            cruise_enabled: false,
            target: 0,
        }
    }

    pub fn sample(&mut self) -> InputSample {
        let gas = self.board.is_pressed(Input::GasPedal);
        let brake = self.board.is_pressed(Input::BrakePedal);
        let toggle_level = self.board.read_input(Input::CruiseToggle);

        if self.prev_toggle_level && !toggle_level {
            self.cruise_enabled = !self.cruise_enabled;
            if self.cruise_enabled {
                self.target = self.velocity.get(0);
                info!("[Input] cruise on, target velocity {}", self.target);
            } else {
                info!("[Input] cruise off");
            }
        }
        self.prev_toggle_level = toggle_level;

        if brake && self.cruise_enabled {
            self.cruise_enabled = false;
            debug!("[Input] brake cancelled cruise");
        }

        let sample = InputSample {
            gas,
            brake,
            cruise: self.cruise_enabled,
            target_velocity: self.target,
        };

        self.gas.put(sample.gas);
        self.brake.put(sample.brake);
        self.cruise.put(sample.cruise);
        self.target_velocity.put(sample.target_velocity);
        sample
    }
}

impl PeriodicTask for InputSampler {
    fn name(&self) -> &'static str {
        "input"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.sample();
    }
}
