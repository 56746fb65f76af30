pub mod control;
pub mod display;
pub mod input;
pub mod signals;
pub mod vehicle;
