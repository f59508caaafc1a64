use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds returned by the geolocation pipeline
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum LocationError {
    /// Fewer than the minimum number of usable stations
    #[error("insufficient observations: {available} usable, {required} required")]
    InsufficientObservations { available: usize, required: usize },

    /// Station configuration or normal matrix is singular
    #[error("degenerate geometry ({issue:?}): {detail}")]
    DegenerateGeometry { issue: GeometryIssue, detail: String },

    /// Iteration cap exceeded or the update grew without bound
    #[error("solver diverged after {iterations} iterations: {reason}")]
    SolverDivergence { iterations: usize, reason: String },

    /// Coordinate, timestamp or weight outside its declared bounds
    #[error("invalid observation from station '{station_id}': {reason}")]
    InvalidObservation { station_id: String, reason: String },
}

/// Geometric issue behind a `DegenerateGeometry` failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryIssue {
    Coincident,
    Collinear,
    SingularNormalMatrix,
    EstimateOnStation,
}

impl LocationError {
    pub fn invalid(station_id: &str, reason: impl Into<String>) -> Self {
        LocationError::InvalidObservation {
            station_id: station_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn degenerate(issue: GeometryIssue, detail: impl Into<String>) -> Self {
        LocationError::DegenerateGeometry {
            issue,
            detail: detail.into(),
        }
    }

    pub fn divergence(iterations: usize, reason: impl Into<String>) -> Self {
        LocationError::SolverDivergence {
            iterations,
            reason: reason.into(),
        }
    }

    /// Short machine-readable name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            LocationError::InsufficientObservations { .. } => "insufficient_observations",
            LocationError::DegenerateGeometry { .. } => "degenerate_geometry",
            LocationError::SolverDivergence { .. } => "solver_divergence",
            LocationError::InvalidObservation { .. } => "invalid_observation",
        }
    }
}

pub type LocationResult<T> = Result<T, LocationError>;
