//! Input validation, error kinds and accuracy evaluation

pub mod accuracy;
pub mod data;
pub mod error;

pub use accuracy::AccuracyReport;
pub use data::{is_valid_eui, parse_eui_list, validate_observation};
pub use error::{GeometryIssue, LocationError, LocationResult};
