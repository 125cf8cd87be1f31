pub mod artifact;
pub mod channel;
pub mod cli;
pub mod config;
pub mod consts;
pub mod core;
pub mod error;
pub mod executor;
pub mod gzip;
pub mod model;
pub mod sample;
