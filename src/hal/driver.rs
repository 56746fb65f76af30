//! driver.rs
//! Scripted "driver" that works the pedals and switches of a SimBoard on a
//! timeline, standing in for a person at the lab kit during host runs.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::info;

use crate::hal::board::Input;
use crate::hal::sim_board::SimBoard;

const POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    Press(Input),
    Release(Input),
    SetLoad(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStep {
    pub at: Duration,
    pub action: DriverAction,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    steps: Vec<DriverStep>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, at: Duration, action: DriverAction) -> Self {
        self.steps.push(DriverStep { at, action });
        self
    }

    /// Press, then release `hold` later.
    pub fn tap(self, at: Duration, input: Input, hold: Duration) -> Self {
        self.at(at, DriverAction::Press(input))
            .at(at + hold, DriverAction::Release(input))
    }

    /// Accelerate, engage cruise, coast on cruise, brake, accelerate again.
    pub fn demo(run: Duration) -> Self {
        let s = |secs: f64| Duration::from_secs_f64(secs).min(run);
        Self::new()
            .at(s(0.0), DriverAction::Press(Input::GasPedal))
            .at(s(8.0), DriverAction::Release(Input::GasPedal))
            .tap(s(8.5), Input::CruiseToggle, Duration::from_millis(300))
            .tap(s(18.0), Input::BrakePedal, Duration::from_millis(1500))
            .at(s(21.0), DriverAction::Press(Input::GasPedal))
            .at(s(25.0), DriverAction::Release(Input::GasPedal))
    }

    pub fn steps(&self) -> &[DriverStep] {
        &self.steps
    }

    pub fn apply(board: &SimBoard, action: DriverAction) {
        match action {
            DriverAction::Press(input) => board.press(input),
            DriverAction::Release(input) => board.release(input),
            DriverAction::SetLoad(value) => board.set_load_switches(value),
        }
    }

    /// Play the script on its own thread until it ends or `running` drops.
    pub fn spawn(self, board: Arc<SimBoard>, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        let mut steps = self.steps;
        steps.sort_by_key(|s| s.at);

        thread::spawn(move || {
            let start = Instant::now();
            for step in steps {
                while start.elapsed() < step.at {
                    if !running.load(Ordering::Acquire) {
                        return;
                    }
                    thread::sleep(POLL.min(step.at.saturating_sub(start.elapsed())));
                }
                info!("[Driver] t={:?} {:?}", step.at, step.action);
                Self::apply(&board, step.action);
            }
        })
    }
}
