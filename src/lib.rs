//! TDOA Geolocation Engine
//!
//! Estimates the position of a radio transmitter from the arrival times of
//! one transmission at three or more time-synchronised receiving stations,
//! using an iterative Taylor-series least-squares solve in a local tangent
//! plane.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Event, GeoPoint, Observation, MIN_STATIONS, SPEED_OF_LIGHT_M_S};
pub use crate::api::{LocationEngine, SolveResult};
pub use crate::utils::config::{ConfigError, EngineConfig, InitialGuess, SolverConfig, TimeResolution};
pub use crate::validation::error::{GeometryIssue, LocationError, LocationResult};
