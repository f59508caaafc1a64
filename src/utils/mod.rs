//! Configuration and logging

pub mod config;
pub mod logging;

pub use config::{ConfigError, EngineConfig};
