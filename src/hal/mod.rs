pub mod board;
pub mod driver;
pub mod sim_board;
