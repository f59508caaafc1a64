//! Closed-form starting points for the iterative solve
//!
//! With `u = p − P_ref`, `q_i = P_i − P_ref` and the unknown reference
//! distance `d = |u|`, squaring `|u − q_i| = d + Δ_i` gives one linear
//! equation per row:
//!
//! `q_i·u = (|q_i|² − Δ_i²)/2 − Δ_i·d`
//!
//! The weighted least-squares solution is affine in `d`, `u = u₀ + d·v`, and
//! substituting it into `|u| = d` leaves a quadratic. Each non-negative root
//! is a candidate. With three stations the candidates are exact; with more
//! they start the iteration close to the least-squares optimum.

use crate::processing::observation_set::ObservationSet;
use nalgebra::{Matrix2, Vector2};

/// Leading coefficient below which the quadratic is treated as linear
const LINEAR_EPSILON: f64 = 1e-12;

/// Candidate device positions, nearest to the station centroid first.
///
/// Empty when the stations give no well-conditioned linear system or the
/// quadratic has no non-negative root.
pub fn closed_form_candidates(set: &ObservationSet, singularity_tolerance: f64) -> Vec<Vector2<f64>> {
    let stations = set.stations();
    let origin = set.reference().position;

    let mut normal = Matrix2::<f64>::zeros();
    let mut constant = Vector2::<f64>::zeros();
    let mut slope = Vector2::<f64>::zeros();

    for row in set.range_differences() {
        let q = stations[row.station].position - origin;
        let delta = row.meters;
        normal += row.weight * q * q.transpose();
        constant += row.weight * 0.5 * (q.norm_squared() - delta * delta) * q;
        slope += row.weight * delta * q;
    }

    let trace = normal.trace();
    if !(trace > 0.0) || !(normal.determinant() / (trace * trace) >= singularity_tolerance) {
        return Vec::new();
    }
    let Some(inverse) = normal.try_inverse() else {
        return Vec::new();
    };

    let u0 = inverse * constant;
    let v = -(inverse * slope);

    // (v·v − 1)d² + 2(u₀·v)d + u₀·u₀ = 0
    let a = v.norm_squared() - 1.0;
    let half_b = u0.dot(&v);
    let c = u0.norm_squared();

    let roots = if a.abs() < LINEAR_EPSILON {
        if half_b == 0.0 {
            Vec::new()
        } else {
            vec![-c / (2.0 * half_b)]
        }
    } else {
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return Vec::new();
        }
        let root = discriminant.sqrt();
        vec![(-half_b - root) / a, (-half_b + root) / a]
    };

    let centroid = set.centroid();
    let mut candidates: Vec<Vector2<f64>> = roots
        .into_iter()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| origin + u0 + d * v)
        .filter(|p| p.iter().all(|coord| coord.is_finite()))
        .collect();
    candidates.sort_by(|p, q| (p - centroid).norm().total_cmp(&(q - centroid).norm()));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::projection::great_circle_distance_m;
    use crate::core::{Event, GeoPoint, Observation, SPEED_OF_LIGHT_M_S};
    use crate::processing::observation_set::ObservationSetBuilder;
    use crate::processing::weighting::UniformWeight;
    use crate::utils::config::{EngineConfig, TimeResolution};

    const STATIONS: [(&str, f64, f64); 3] = [
        ("gw-a", 43.128362, -70.742126),
        ("gw-b", 42.951207, -70.895935),
        ("gw-c", 43.118840, -70.941940),
    ];

    fn worked_example() -> Event {
        Event::new(
            "00000000FFFFFFFF",
            0,
            0,
            0,
            vec![
                Observation::new("FF250C00010001A8", 29563, 0.0, 0.0, 43.128362, -70.742126),
                Observation::new("FF250C00010001A9", 49133, 0.0, 0.0, 42.951207, -70.895935),
                Observation::new("FF250C00010001A7", 49534, 0.0, 0.0, 43.118840, -70.941940),
            ],
        )
    }

    #[test]
    fn test_three_stations_solved_exactly() {
        let config = EngineConfig::default();
        let device = GeoPoint::new(42.92, -70.96);
        let observations = STATIONS
            .iter()
            .map(|(id, lat, lng)| {
                let distance = great_circle_distance_m(&device, &GeoPoint::new(*lat, *lng));
                let ticks = (distance / SPEED_OF_LIGHT_M_S * 1e9).round() as u64;
                Observation::new(*id, ticks, 0.0, 0.0, *lat, *lng)
            })
            .collect();
        let event = Event::new("00000000FFFFFFFF", 0, 0, 0, observations);
        let set = ObservationSetBuilder::new(&config, &UniformWeight).build(&event).unwrap();

        let candidates = closed_form_candidates(&set, config.solver.singularity_tolerance);
        assert!(!candidates.is_empty());

        // One of the candidates reproduces the device up to tick rounding
        let truth = set.projection().to_local(&device);
        let nearest = candidates
            .iter()
            .map(|c| (c - truth).norm())
            .fold(f64::INFINITY, f64::min);
        assert!(nearest < 2.0, "nearest candidate {} m from the device", nearest);
    }

    #[test]
    fn test_candidates_ordered_by_distance_to_centroid() {
        let config = EngineConfig::default();
        let set = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&worked_example())
            .unwrap();

        let candidates = closed_form_candidates(&set, config.solver.singularity_tolerance);
        let centroid = set.centroid();
        assert!(candidates
            .windows(2)
            .all(|pair| (pair[0] - centroid).norm() <= (pair[1] - centroid).norm()));
    }

    #[test]
    fn test_inconsistent_differences_give_no_candidate() {
        // Counters read as microseconds: range differences far larger than
        // the station baselines admit no real root
        let config = EngineConfig {
            time_resolution: TimeResolution::Microseconds,
            ..EngineConfig::default()
        };
        let set = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&worked_example())
            .unwrap();

        assert!(closed_form_candidates(&set, config.solver.singularity_tolerance).is_empty());
    }
}
