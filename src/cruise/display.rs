//! Display task: mirrors the current signals onto the board outputs.

use std::{sync::Arc, time::Duration};

use log::debug;

use crate::cruise::signals::{SignalReaders, SignalSnapshot};
use crate::hal::board::{Board, LED_BAR_LEN, Led};
use crate::rtos::scheduler::PeriodicTask;

/// One LED per 100 m of track, least significant register first.
pub fn led_bar_pattern(position: i32) -> [u8; 3] {
    let index = (position / 1000).clamp(0, LED_BAR_LEN as i32 - 1);
    let word: u32 = 1 << index;
    let [b0, b1, b2, _] = word.to_le_bytes();
    [b0, b1, b2]
}

/// Throttle and velocity in m/s, two right-aligned columns each.
pub fn seg7_text(throttle: i32, velocity: i32) -> String {
    format!("{:2}{:2}", throttle, velocity / 10)
}

pub struct DisplayTask {
    board: Arc<dyn Board>,
    period: Duration,
    signals: SignalReaders,
}

impl DisplayTask {
    pub fn new(board: Arc<dyn Board>, period: Duration, signals: SignalReaders) -> Self {
        board.seg7_clear();
        Self { board, period, signals }
    }

    pub fn refresh(&self) -> SignalSnapshot {
        let s = self.signals.snapshot();

        self.board.set_led(Led::Green, s.gas);
        self.board.set_led(Led::Red, s.brake);
        self.board.set_led(Led::Yellow, s.cruise);
        self.board.shift_reg_write_all(led_bar_pattern(s.position));
        self.board.seg7_write(&seg7_text(s.throttle, s.velocity));

        debug!(
            "[Display] throttle={} velocity={} position={} cruise={} target={}",
            s.throttle, s.velocity, s.position, s.cruise, s.target_velocity
        );
        s
    }
}

impl PeriodicTask for DisplayTask {
    fn name(&self) -> &'static str {
        "display"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn release(&mut self) {
        self.refresh();
    }
}
