//! Public entry points
//!
//! [`LocationEngine`] computes a location for one event; the formatting
//! module renders results for the command line and the map viewer.

pub mod engine;
pub mod formatting;

pub use engine::{LocationEngine, SolveResult};
pub use formatting::{JsonFormatter, MapMarker, MarkerColor, PinData, TextFormatter};
