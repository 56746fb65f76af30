//! sim_board.rs
//! In-memory board for running the cruise tasks on a host.
//! Inputs are set by tests, the CLI or a ScriptedDriver; outputs are kept so
//! they can be inspected.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::random_range;

use crate::hal::board::{Axis, Board, Input, LED_BAR_LEN, LOAD_SWITCHES, Led};

const ACCEL_NOISE: f32 = 0.02;

#[derive(Debug, Default, Clone)]
pub struct BoardOutputs {
    pub leds: HashMap<Led, bool>,
    pub led_bar: [u8; 3],
    pub seg7: String,
}

#[derive(Debug)]
struct BoardState {
    /// Pin levels that were driven explicitly; everything else is idle.
    levels: HashMap<Input, bool>,
    outputs: BoardOutputs,
    accel: [f32; 3],
}

pub struct SimBoard {
    state: Mutex<BoardState>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BoardState {
                levels: HashMap::new(),
                outputs: BoardOutputs::default(),
                accel: [0.0, 0.0, 1.0],
            }),
        }
    }

    /// Drive a button to its pressed (low) level.
    pub fn press(&self, input: Input) {
        self.state.lock().levels.insert(input, false);
    }

    pub fn release(&self, input: Input) {
        self.state.lock().levels.insert(input, true);
    }

    pub fn set_pressed(&self, input: Input, pressed: bool) {
        if pressed {
            self.press(input);
        } else {
            self.release(input);
        }
    }

    /// Set SW10..SW17 from an 8-bit value. A set bit is a switch in the
    /// high position.
    pub fn set_load_switches(&self, value: u8) {
        let mut st = self.state.lock();
        for bit in 0..LOAD_SWITCHES {
            st.levels.insert(Input::LoadSwitch(bit), value & (1 << bit) != 0);
        }
    }

    pub fn set_acceleration(&self, axis: Axis, g: f32) {
        self.state.lock().accel[axis_index(axis)] = g;
    }

    pub fn outputs(&self) -> BoardOutputs {
        self.state.lock().outputs.clone()
    }

    pub fn led(&self, led: Led) -> bool {
        self.state.lock().outputs.leds.get(&led).copied().unwrap_or(false)
    }

    /// Index of the lit LED on the bar, if exactly one is lit.
    pub fn lit_bar_led(&self) -> Option<usize> {
        let bar = self.state.lock().outputs.led_bar;
        let word = u32::from_le_bytes([bar[0], bar[1], bar[2], 0]);
        (word.count_ones() == 1)
            .then(|| word.trailing_zeros() as usize)
            .filter(|&i| i < LED_BAR_LEN)
    }
}

/// Buttons idle high (released), load switches idle low (value 0).
fn idle_level(input: Input) -> bool {
    !matches!(input, Input::LoadSwitch(_))
}

fn axis_index(axis: Axis) -> usize {
    match axis {
        Axis::X => 0,
        Axis::Y => 1,
        Axis::Z => 2,
    }
}

impl Board for SimBoard {
    fn read_input(&self, input: Input) -> bool {
        let st = self.state.lock();
        st.levels.get(&input).copied().unwrap_or_else(|| idle_level(input))
    }

    fn set_led(&self, led: Led, on: bool) {
        self.state.lock().outputs.leds.insert(led, on);
    }

    fn toggle_led(&self, led: Led) {
        let mut st = self.state.lock();
        let entry = st.outputs.leds.entry(led).or_insert(false);
        *entry = !*entry;
    }

    fn shift_reg_write_all(&self, pattern: [u8; 3]) {
        self.state.lock().outputs.led_bar = pattern;
    }

    fn seg7_clear(&self) {
        self.state.lock().outputs.seg7.clear();
    }

    fn seg7_write(&self, text: &str) {
        self.state.lock().outputs.seg7 = text.to_string();
    }

    fn accel_sample(&self, axis: Axis) -> f32 {
        let base = self.state.lock().accel[axis_index(axis)];
        base + random_range(-ACCEL_NOISE..ACCEL_NOISE)
    }
}
