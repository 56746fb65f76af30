pub mod load;
pub mod watchdog;
