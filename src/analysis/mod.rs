pub mod rm_sim;
