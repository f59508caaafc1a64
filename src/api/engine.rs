//! Location engine
//!
//! End-to-end computation for one event: build the observation set, run the
//! Taylor-series solver, sanity-check the estimate and convert it back to
//! geodetic coordinates. The engine holds only immutable configuration, so a
//! single instance can serve concurrent solves.

use crate::algorithms::taylor_series::{IterationRecord, TaylorSeriesSolver};
use crate::core::{Event, GeoPoint};
use crate::processing::observation_set::ObservationSetBuilder;
use crate::processing::weighting::{WeightPolicy, WeightingScheme};
use crate::utils::config::{ConfigError, EngineConfig};
use crate::validation::error::{LocationError, LocationResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Final estimate for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub latitude: f64,
    pub longitude: f64,
    pub iterations: usize,
    /// Weighted residual norm at the converged estimate (m)
    pub residual_norm: f64,
    pub reference_station: String,
    pub station_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<IterationRecord>,
}

impl SolveResult {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// TDOA geolocation orchestrator
#[derive(Debug, Clone)]
pub struct LocationEngine<W: WeightPolicy = WeightingScheme> {
    config: EngineConfig,
    policy: W,
}

impl LocationEngine<WeightingScheme> {
    /// Engine using the weighting scheme selected in `config`.
    ///
    /// Fails when `config` does not pass [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let policy = config.weighting;
        Self::with_policy(config, policy)
    }
}

impl Default for LocationEngine<WeightingScheme> {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            policy: config.weighting,
            config,
        }
    }
}

impl<W: WeightPolicy> LocationEngine<W> {
    /// Engine with a caller-supplied weighting policy
    pub fn with_policy(config: EngineConfig, policy: W) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, policy })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Estimate the transmitter position of `event`
    pub fn compute_device_location(&self, event: &Event) -> LocationResult<SolveResult> {
        let set = ObservationSetBuilder::new(&self.config, &self.policy).build(event)?;

        let convergence = TaylorSeriesSolver::new(&self.config.solver, self.config.initial_guess)
            .with_trace(self.config.trace_iterations)
            .solve(&set)
            .into_result()?;

        let offset = convergence.position.norm();
        if offset > self.config.max_solution_radius_m {
            return Err(LocationError::divergence(
                convergence.iterations,
                format!(
                    "estimate {:.0} m from the station cluster exceeds {:.0} m",
                    offset, self.config.max_solution_radius_m
                ),
            ));
        }

        let position = set.projection().to_geodetic(&convergence.position);
        if !position.is_valid() {
            return Err(LocationError::divergence(
                convergence.iterations,
                "estimate does not map to a valid coordinate",
            ));
        }

        info!(
            device = %event.device_id,
            sequence = event.sequence_no,
            lat = position.lat,
            lng = position.lng,
            iterations = convergence.iterations,
            "location computed"
        );
        debug!(
            residual = convergence.residual_norm,
            spread_ratio = set.spread().ratio(),
            "solve summary"
        );

        Ok(SolveResult {
            latitude: position.lat,
            longitude: position.lng,
            iterations: convergence.iterations,
            residual_norm: convergence.residual_norm,
            reference_station: set.reference().station_id.clone(),
            station_count: set.stations().len(),
            trace: convergence.trace,
        })
    }
}
