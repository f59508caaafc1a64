//! Station geometry assessment

use crate::utils::config::GeometryConfig;
use crate::validation::error::{GeometryIssue, LocationError, LocationResult};
use nalgebra::{Matrix2, Vector2};

/// Spread of the station cluster along its principal axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationSpread {
    /// Major eigenvalue of the scatter matrix (m²)
    pub major: f64,
    /// Minor eigenvalue of the scatter matrix (m²)
    pub minor: f64,
}

impl StationSpread {
    pub fn ratio(&self) -> f64 {
        if self.major > 0.0 {
            self.minor / self.major
        } else {
            0.0
        }
    }
}

/// Eigenvalues of the mean-centred 2x2 scatter matrix of `positions`
pub fn station_spread(positions: &[Vector2<f64>]) -> StationSpread {
    if positions.is_empty() {
        return StationSpread { major: 0.0, minor: 0.0 };
    }

    let n = positions.len() as f64;
    let mean = positions.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p) / n;

    let scatter = positions.iter().fold(Matrix2::<f64>::zeros(), |acc, p| {
        let d = p - mean;
        acc + d * d.transpose()
    }) / n;

    // Closed form for a symmetric 2x2 matrix
    let half_trace = 0.5 * (scatter[(0, 0)] + scatter[(1, 1)]);
    let det = scatter[(0, 0)] * scatter[(1, 1)] - scatter[(0, 1)] * scatter[(1, 0)];
    let disc = (half_trace * half_trace - det).max(0.0).sqrt();

    StationSpread {
        major: half_trace + disc,
        minor: (half_trace - disc).max(0.0),
    }
}

/// Reject coincident or collinear station layouts
pub fn check_station_geometry(
    positions: &[Vector2<f64>],
    config: &GeometryConfig,
) -> LocationResult<StationSpread> {
    let spread = station_spread(positions);

    if spread.major < config.min_spread_m2 {
        return Err(LocationError::degenerate(
            GeometryIssue::Coincident,
            format!("stations span {:.3} m² (minimum {})", spread.major, config.min_spread_m2),
        ));
    }

    if spread.ratio() < config.collinearity_ratio {
        return Err(LocationError::degenerate(
            GeometryIssue::Collinear,
            format!(
                "minor/major spread ratio {:.3e} below {:.3e}",
                spread.ratio(),
                config.collinearity_ratio
            ),
        ));
    }

    Ok(spread)
}

/// Reject stations that line up in latitude/longitude.
///
/// `plate_carree` holds the stations' equirectangular offsets. A parallel or
/// any other straight line in latitude/longitude bows slightly in the
/// azimuthal-equidistant plane, enough to pass [`check_station_geometry`],
/// yet such a layout leaves the device position as poorly constrained as a
/// truly collinear one.
pub fn check_coordinate_alignment(
    plate_carree: &[Vector2<f64>],
    config: &GeometryConfig,
) -> LocationResult<()> {
    let spread = station_spread(plate_carree);
    if spread.ratio() < config.collinearity_ratio {
        return Err(LocationError::degenerate(
            GeometryIssue::Collinear,
            format!(
                "stations lie on one line in latitude/longitude (spread ratio {:.3e})",
                spread.ratio()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spread_of_square() {
        let positions = [
            Vector2::new(-1000.0, -1000.0),
            Vector2::new(1000.0, -1000.0),
            Vector2::new(1000.0, 1000.0),
            Vector2::new(-1000.0, 1000.0),
        ];
        let spread = station_spread(&positions);
        assert_relative_eq!(spread.major, 1.0e6);
        assert_relative_eq!(spread.minor, 1.0e6);
        assert!(check_station_geometry(&positions, &GeometryConfig::default()).is_ok());
    }

    #[test]
    fn test_collinear_rejected() {
        let positions = [
            Vector2::new(0.0, 0.0),
            Vector2::new(3000.0, 4000.0),
            Vector2::new(-6000.0, -8000.0),
        ];
        let err = check_station_geometry(&positions, &GeometryConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LocationError::DegenerateGeometry { issue: GeometryIssue::Collinear, .. }
        ));
    }

    #[test]
    fn test_coincident_rejected() {
        let positions = [Vector2::new(5.0, 5.0); 4];
        let err = check_station_geometry(&positions, &GeometryConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LocationError::DegenerateGeometry { issue: GeometryIssue::Coincident, .. }
        ));
    }

    #[test]
    fn test_thin_triangle_accepted_above_ratio() {
        // 20 km baseline with a 100 m offset: ratio ~3e-5
        let positions = [
            Vector2::new(-10_000.0, 0.0),
            Vector2::new(10_000.0, 0.0),
            Vector2::new(0.0, 100.0),
        ];
        let spread = check_station_geometry(&positions, &GeometryConfig::default()).unwrap();
        assert!(spread.ratio() > 1e-6);
        assert!(check_coordinate_alignment(&positions, &GeometryConfig::default()).is_ok());
    }

    #[test]
    fn test_bowed_parallel_rejected_in_coordinates() {
        // Three stations on the 43rd parallel spanning 49 km, as placed by the
        // azimuthal-equidistant projection and by plate carrée
        let config = GeometryConfig::default();
        let projected = [
            Vector2::new(-24_396.8, 43.56),
            Vector2::new(0.0, 0.0),
            Vector2::new(24_396.8, 43.56),
        ];
        let plate_carree = [
            Vector2::new(-24_396.8, 0.0),
            Vector2::new(0.0, 0.0),
            Vector2::new(24_396.8, 0.0),
        ];

        assert!(check_station_geometry(&projected, &config).is_ok());
        let err = check_coordinate_alignment(&plate_carree, &config).unwrap_err();
        assert!(matches!(
            err,
            LocationError::DegenerateGeometry { issue: GeometryIssue::Collinear, .. }
        ));
    }
}
