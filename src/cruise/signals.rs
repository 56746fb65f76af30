//! The seven state channels of the cruise-control system, created together
//! before any task starts. Each writer is handed to exactly one task.

use crate::rtos::channel::{StateReader, StateWriter, state_channel};

/// Producer halves, split up and moved into the owning tasks.
pub struct SignalWriters {
    pub gas: StateWriter<bool>,
    pub brake: StateWriter<bool>,
    pub cruise: StateWriter<bool>,
    pub target_velocity: StateWriter<i32>,
    pub velocity: StateWriter<i32>,
    pub position: StateWriter<i32>,
    pub throttle: StateWriter<i32>,
}

#[derive(Clone)]
pub struct SignalReaders {
    pub gas: StateReader<bool>,
    pub brake: StateReader<bool>,
    pub cruise: StateReader<bool>,
    pub target_velocity: StateReader<i32>,
    pub velocity: StateReader<i32>,
    pub position: StateReader<i32>,
    pub throttle: StateReader<i32>,
}

/// Last published values, with the defaults used before the first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSnapshot {
    pub gas: bool,
    pub brake: bool,
    pub cruise: bool,
    pub target_velocity: i32,
    pub velocity: i32,
    pub position: i32,
    pub throttle: i32,
}

impl SignalReaders {
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            gas: self.gas.get(false),
            brake: self.brake.get(false),
            cruise: self.cruise.get(false),
            target_velocity: self.target_velocity.get(0),
            velocity: self.velocity.get(0),
            position: self.position.get(0),
            throttle: self.throttle.get(0),
        }
    }
}

pub fn signals() -> (SignalWriters, SignalReaders) {
    let (gas_tx, gas_rx) = state_channel();
    let (brake_tx, brake_rx) = state_channel();
    let (cruise_tx, cruise_rx) = state_channel();
    let (target_tx, target_rx) = state_channel();
    let (velocity_tx, velocity_rx) = state_channel();
    let (position_tx, position_rx) = state_channel();
    let (throttle_tx, throttle_rx) = state_channel();

    (
        SignalWriters {
            gas: gas_tx,
            brake: brake_tx,
            cruise: cruise_tx,
            target_velocity: target_tx,
            velocity: velocity_tx,
            position: position_tx,
            throttle: throttle_tx,
        },
        SignalReaders {
            gas: gas_rx,
            brake: brake_rx,
            cruise: cruise_rx,
            target_velocity: target_rx,
            velocity: velocity_rx,
            position: position_rx,
            throttle: throttle_rx,
        },
    )
}
