//! # Cruise-control real-time system
//!
//! Periodic tasks sharing single-slot state channels: pedal/switch sampling,
//! a PID throttle controller, a kinematic vehicle model and a display, all
//! released by a rate-monotonic scheduler on host threads. A watchdog fed by a
//! background task reports CPU overload; an optional load generator creates it.
//!
//! ## Layout
//! - `rtos`: state channels, release clock, periodic scheduler
//! - `cruise`: the control application tasks
//! - `supervision`: watchdog, feeder and extra-load generator
//! - `hal`: board contract, simulated board, scripted driver
//! - `analysis`: utilization bound and virtual-time RM simulation
//! - `utils`: configuration, errors, metrics

pub mod analysis;
pub mod cruise;
pub mod hal;
pub mod rtos;
pub mod supervision;
pub mod system;
pub mod utils;
