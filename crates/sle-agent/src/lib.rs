//! SLE agent: replays detections through the incident engine with
//! file-backed ticketing, audit and history.

pub mod config;
pub mod history_file;
pub mod runner;
pub mod scenario;
pub mod sinks;
