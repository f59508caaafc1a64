//! Post-solve filtering of a stationary device's estimates

use crate::algorithms::projection::{geographic_mean, great_circle_distance_m, normalize_longitude};
use crate::core::GeoPoint;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ground truth spread beyond which the device is treated as moving (degrees)
pub const MOVING_DEVICE_THRESHOLD_DEG: f64 = 1e-4;

/// A solved event paired with the device's reported position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedEstimate {
    pub estimate: GeoPoint,
    pub truth: GeoPoint,
}

/// Outcome of [`trimmed_centroid`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilteredLocation {
    pub centroid: GeoPoint,
    pub truth: GeoPoint,
    /// Estimates left after trimming
    pub retained: usize,
    /// Great-circle distance from centroid to truth (m)
    pub error_m: f64,
}

/// Whether the reported positions of the device wander
pub fn is_moving(estimates: &[TrackedEstimate]) -> bool {
    let Some(first) = estimates.first() else {
        return false;
    };
    estimates.iter().any(|e| {
        (e.truth.lat - first.truth.lat).abs() > MOVING_DEVICE_THRESHOLD_DEG
            || normalize_longitude(e.truth.lng - first.truth.lng).abs() > MOVING_DEVICE_THRESHOLD_DEG
    })
}

/// Average the estimates, repeatedly discarding the one farthest from the
/// current average until `min_samples` remain.
///
/// Returns `None` for an empty input or a moving device.
pub fn trimmed_centroid(estimates: &[TrackedEstimate], min_samples: usize) -> Option<FilteredLocation> {
    let truth = estimates.first()?.truth;
    if is_moving(estimates) {
        warn!("device is moving, estimates cannot be combined");
        return None;
    }

    let mut points: Vec<GeoPoint> = estimates.iter().map(|e| e.estimate).collect();
    let mut centroid = geographic_mean(&points)?;

    while points.len() > min_samples.max(1) {
        let worst = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, great_circle_distance_m(&centroid, p)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)?;
        points.swap_remove(worst);
        centroid = geographic_mean(&points)?;
    }

    Some(FilteredLocation {
        centroid,
        truth,
        retained: points.len(),
        error_m: great_circle_distance_m(&centroid, &truth),
    })
}
