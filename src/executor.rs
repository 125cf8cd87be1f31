pub mod job;
pub mod manager;
pub mod runner;
