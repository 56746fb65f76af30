pub mod channel;
pub mod release;
pub mod scheduler;
