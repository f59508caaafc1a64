//! Geodesy and numerical solving

pub mod projection;
pub mod geometry;
pub mod closed_form;
pub mod taylor_series;

pub use projection::{geographic_mean, great_circle_distance_m, normalize_longitude, LocalProjection};
pub use geometry::{check_coordinate_alignment, check_station_geometry, station_spread, StationSpread};
pub use closed_form::closed_form_candidates;
pub use taylor_series::{IterationRecord, SolverState, TaylorSeriesSolver};
