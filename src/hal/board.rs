//! board.rs
//! Narrow contract the cruise tasks need from the lab board: digital inputs,
//! LEDs, the shift-register LED bar, the seven-segment display and the
//! accelerometer. Switch inputs are active-low: a pressed button reads `false`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    /// SW5
    BrakePedal,
    /// SW6
    CruiseToggle,
    /// SW7
    GasPedal,
    /// SW10..SW17, bit 0 = SW10
    LoadSwitch(u8),
}

pub const LOAD_SWITCHES: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Green,
    Red,
    Yellow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Number of LEDs on the shift-register bar (three 8-bit registers).
pub const LED_BAR_LEN: usize = 24;

pub trait Board: Send + Sync {
    /// Raw pin level.
    fn read_input(&self, input: Input) -> bool;

    fn set_led(&self, led: Led, on: bool);
    fn toggle_led(&self, led: Led);

    /// Bytes go out least significant register first.
    fn shift_reg_write_all(&self, pattern: [u8; 3]);

    fn seg7_clear(&self);
    fn seg7_write(&self, text: &str);

    fn accel_sample(&self, axis: Axis) -> f32;

    /// Active-low helper.
    fn is_pressed(&self, input: Input) -> bool {
        !self.read_input(input)
    }
}
