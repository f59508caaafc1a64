//! Observation quality weighting for the least-squares objective

use crate::core::Observation;
use crate::utils::config::{positive, ConfigError};
use serde::{Deserialize, Serialize};

/// SNR is clamped into this range before weighting (dB)
const SNR_CLAMP_DB: f64 = 30.0;

/// Maps an observation to its least-squares confidence weight
pub trait WeightPolicy {
    fn weight(&self, observation: &Observation) -> f64;
}

/// Every observation counts equally
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl WeightPolicy for UniformWeight {
    fn weight(&self, _observation: &Observation) -> f64 {
        1.0
    }
}

/// Weight grows exponentially with SNR: `exp(snr / scale_db)`
#[derive(Debug, Clone, Copy)]
pub struct SnrWeight {
    pub scale_db: f64,
}

impl WeightPolicy for SnrWeight {
    fn weight(&self, observation: &Observation) -> f64 {
        let snr = observation.snr.clamp(-SNR_CLAMP_DB, SNR_CLAMP_DB);
        (snr / self.scale_db).exp()
    }
}

/// Configurable weighting selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum WeightingScheme {
    Uniform,
    Snr { scale_db: f64 },
}

impl Default for WeightingScheme {
    fn default() -> Self {
        WeightingScheme::Uniform
    }
}

impl WeightingScheme {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            WeightingScheme::Uniform => Ok(()),
            WeightingScheme::Snr { scale_db } => positive("weighting.scale_db", *scale_db),
        }
    }
}

impl WeightPolicy for WeightingScheme {
    fn weight(&self, observation: &Observation) -> f64 {
        match *self {
            WeightingScheme::Uniform => UniformWeight.weight(observation),
            WeightingScheme::Snr { scale_db } => SnrWeight { scale_db }.weight(observation),
        }
    }
}

/// Weight of a range-difference row built from station `i` and the reference.
///
/// The difference of two measurements carries the sum of their variances, so
/// the row weight is the inverse of `1/w_i + 1/w_ref`.
pub fn pair_weight(w_station: f64, w_reference: f64) -> f64 {
    w_station * w_reference / (w_station + w_reference)
}
