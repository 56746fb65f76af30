//! Static configuration of the cruise-control task set.
//! Built once before the scheduler starts; nothing reconfigures it afterwards.

use std::time::Duration;

use crate::utils::error::{Result, SystemError};

pub const INPUT_PERIOD_MS: u64 = 50;
pub const VEHICLE_PERIOD_MS: u64 = 100;
pub const CONTROL_PERIOD_MS: u64 = 200;
pub const DISPLAY_PERIOD_MS: u64 = 500;
pub const WATCHDOG_PERIOD_MS: u64 = 1_000;
pub const EXTRA_LOAD_PERIOD_MS: u64 = 25;

/// Throttle increment per control period while the gas pedal is held.
pub const GAS_STEP: i32 = 2;
pub const THROTTLE_MAX: i32 = 80;
/// Fixed deceleration applied while braking (0.1 m/s^2 units).
pub const BRAKE_RETARDATION: i32 = 50;

pub const DEFAULT_RUN_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskPeriods {
    pub input: Duration,
    pub vehicle: Duration,
    pub control: Duration,
    pub display: Duration,
    pub watchdog: Duration,
    pub extra_load: Duration,
}

impl Default for TaskPeriods {
    fn default() -> Self {
        Self {
            input: Duration::from_millis(INPUT_PERIOD_MS),
            vehicle: Duration::from_millis(VEHICLE_PERIOD_MS),
            control: Duration::from_millis(CONTROL_PERIOD_MS),
            display: Duration::from_millis(DISPLAY_PERIOD_MS),
            watchdog: Duration::from_millis(WATCHDOG_PERIOD_MS),
            extra_load: Duration::from_millis(EXTRA_LOAD_PERIOD_MS),
        }
    }
}

impl TaskPeriods {
    fn named(&self) -> [(&'static str, Duration); 6] {
        [
            ("input", self.input),
            ("vehicle", self.vehicle),
            ("control", self.control),
            ("display", self.display),
            ("watchdog", self.watchdog),
            ("extra_load", self.extra_load),
        ]
    }
}

/// Integer PID gains. Defaults: Kp=100, Ki=1, Kd=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGains {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self { kp: 100, ki: 1, kd: 5 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub periods: TaskPeriods,
    pub gains: PidGains,
    pub gas_step: i32,
    pub brake_retardation: i32,
    /// Spawn the stress-test load generator.
    pub extra_load: bool,
    /// Core every task thread is pinned to; `None` leaves placement to the OS.
    pub pin_core: Option<usize>,
    pub run_duration: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            periods: TaskPeriods::default(),
            gains: PidGains::default(),
            gas_step: GAS_STEP,
            brake_retardation: BRAKE_RETARDATION,
            extra_load: false,
            pin_core: Some(0),
            run_duration: Duration::from_secs(DEFAULT_RUN_SECS),
        }
    }
}

impl SystemConfig {
    pub fn with_extra_load(mut self, enabled: bool) -> Self {
        self.extra_load = enabled;
        self
    }

    pub fn with_pin_core(mut self, core: Option<usize>) -> Self {
        self.pin_core = core;
        self
    }

    pub fn with_run_duration(mut self, duration: Duration) -> Self {
        self.run_duration = duration;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (task, period) in self.periods.named() {
            if period.is_zero() {
                return Err(SystemError::ZeroPeriod { task });
            }
        }
        if self.gas_step <= 0 || self.gas_step > THROTTLE_MAX {
            return Err(SystemError::InvalidConfig(format!(
                "gas_step {} outside 1..={}",
                self.gas_step, THROTTLE_MAX
            )));
        }
        if self.brake_retardation <= 0 {
            return Err(SystemError::InvalidConfig(format!(
                "brake_retardation must be positive, got {}",
                self.brake_retardation
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut cfg = SystemConfig::default();
        cfg.periods.control = Duration::ZERO;
        match cfg.validate() {
            Err(SystemError::ZeroPeriod { task }) => assert_eq!(task, "control"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn gas_step_above_saturation_is_rejected() {
        let cfg = SystemConfig { gas_step: 81, ..SystemConfig::default() };
        assert!(matches!(cfg.validate(), Err(SystemError::InvalidConfig(_))));
    }
}
