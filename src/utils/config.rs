use crate::processing::weighting::WeightingScheme;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Tick length of the arrival-time counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeResolution {
    Nanoseconds,
    Microseconds,
}

impl TimeResolution {
    pub fn ticks_per_second(self) -> f64 {
        match self {
            TimeResolution::Nanoseconds => 1_000_000_000.0,
            TimeResolution::Microseconds => 1_000_000.0,
        }
    }

    pub fn to_seconds(self, ticks: u64) -> f64 {
        ticks as f64 / self.ticks_per_second()
    }
}

impl Default for TimeResolution {
    fn default() -> Self {
        TimeResolution::Nanoseconds
    }
}

/// Starting point for the iterative solve.
///
/// The selected start is tried first; the others serve as restart points when
/// it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialGuess {
    /// Exact solution of the range-difference equations linearised in the
    /// reference distance
    ClosedForm,
    /// Centroid of the projected station positions
    Centroid,
    /// Position of the reference (earliest) station, nudged off it
    ReferenceStation,
}

impl Default for InitialGuess {
    fn default() -> Self {
        InitialGuess::ClosedForm
    }
}

/// Convergence tuning for the Taylor-series solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Stop once the correction step is shorter than this (meters)
    pub convergence_threshold_m: f64,
    /// Hard cap on Gauss-Newton iterations
    pub max_iterations: usize,
    /// Relative change of the weighted residual norm treated as a plateau
    pub residual_stagnation_ratio: f64,
    /// Consecutive growing steps before the solve is declared divergent
    pub max_growing_steps: usize,
    /// Normalised determinant below which the normal matrix is singular
    pub singularity_tolerance: f64,
    /// Damping applied after the first rejected step, relative to trace/2
    pub initial_damping: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            convergence_threshold_m: 1.0,
            max_iterations: 50,
            residual_stagnation_ratio: 1e-9,
            max_growing_steps: 4,
            singularity_tolerance: 1e-12,
            initial_damping: 1e-3,
        }
    }
}

/// Station-geometry acceptance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Minimum ratio of the minor to major scatter eigenvalue
    pub collinearity_ratio: f64,
    /// Minimum major scatter eigenvalue (m²); below it stations coincide
    pub min_spread_m2: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            collinearity_ratio: 1e-6,
            min_spread_m2: 1.0,
        }
    }
}

/// Engine-wide configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub time_resolution: TimeResolution,
    pub weighting: WeightingScheme,
    pub initial_guess: InitialGuess,
    /// Skip out-of-bounds observations instead of failing the event
    pub drop_invalid_observations: bool,
    /// Reject estimates farther than this from the station centroid (meters)
    pub max_solution_radius_m: f64,
    /// Record and log every solver iteration
    pub trace_iterations: bool,
    pub solver: SolverConfig,
    pub geometry: GeometryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_resolution: TimeResolution::default(),
            weighting: WeightingScheme::default(),
            initial_guess: InitialGuess::default(),
            drop_invalid_observations: false,
            max_solution_radius_m: 200_000.0,
            trace_iterations: false,
            solver: SolverConfig::default(),
            geometry: GeometryConfig::default(),
        }
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid parameter '{parameter}' = {value}: {reason}")]
    InvalidParameter {
        parameter: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl EngineConfig {
    /// Load a JSON configuration file; absent fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading engine configuration");
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("solver.convergence_threshold_m", self.solver.convergence_threshold_m)?;
        positive("solver.residual_stagnation_ratio", self.solver.residual_stagnation_ratio)?;
        positive("solver.singularity_tolerance", self.solver.singularity_tolerance)?;
        positive("solver.initial_damping", self.solver.initial_damping)?;
        positive("geometry.collinearity_ratio", self.geometry.collinearity_ratio)?;
        positive("geometry.min_spread_m2", self.geometry.min_spread_m2)?;
        positive("max_solution_radius_m", self.max_solution_radius_m)?;

        if self.solver.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "solver.max_iterations",
                value: "0".to_string(),
                reason: "at least one iteration is required",
            });
        }
        if self.solver.max_growing_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "solver.max_growing_steps",
                value: "0".to_string(),
                reason: "must allow at least one growing step",
            });
        }

        self.weighting.validate()
    }
}

pub(crate) fn positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            parameter,
            value: value.to_string(),
            reason: "must be a finite positive number",
        })
    }
}
