pub mod body;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod log;
pub mod preflight;
pub mod transport;
pub mod types;
pub mod workflow;
