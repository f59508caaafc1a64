//! Core types and constants for the TDOA geolocation engine

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
