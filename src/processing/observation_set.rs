//! Validation and normalisation of an event's observations
//!
//! Turns the raw per-station reports of one [`Event`] into the quantities the
//! Taylor-series solver consumes: projected station positions, range
//! differences against the reference station, and quality weights.

use crate::algorithms::geometry::{check_coordinate_alignment, check_station_geometry, StationSpread};
use crate::algorithms::projection::LocalProjection;
use crate::core::{Event, Observation, MIN_STATIONS, SPEED_OF_LIGHT_M_S};
use crate::processing::weighting::{pair_weight, WeightPolicy};
use crate::utils::config::EngineConfig;
use crate::validation::data::validate_observation;
use crate::validation::error::{LocationError, LocationResult};
use nalgebra::Vector2;
use tracing::{debug, warn};

/// A validated station with its projected position
#[derive(Debug, Clone, PartialEq)]
pub struct StationFix {
    pub station_id: String,
    pub position: Vector2<f64>,
    pub timestamp: u64,
    pub weight: f64,
}

/// Measured range difference of one non-reference station
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeDifference {
    /// Index into `ObservationSet::stations`
    pub station: usize,
    /// c·(t_i − t_ref) in metres
    pub meters: f64,
    /// Least-squares weight of the row
    pub weight: f64,
}

/// Solver-ready view of an event
#[derive(Debug, Clone)]
pub struct ObservationSet {
    projection: LocalProjection,
    stations: Vec<StationFix>,
    reference: usize,
    range_differences: Vec<RangeDifference>,
    spread: StationSpread,
}

impl ObservationSet {
    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    pub fn stations(&self) -> &[StationFix] {
        &self.stations
    }

    pub fn reference(&self) -> &StationFix {
        &self.stations[self.reference]
    }

    pub fn reference_index(&self) -> usize {
        self.reference
    }

    pub fn range_differences(&self) -> &[RangeDifference] {
        &self.range_differences
    }

    pub fn spread(&self) -> StationSpread {
        self.spread
    }

    /// Replace the measured rows, for exercising the solver on corrupted input
    #[cfg(test)]
    pub(crate) fn with_range_differences(mut self, range_differences: Vec<RangeDifference>) -> Self {
        self.range_differences = range_differences;
        self
    }

    pub fn centroid(&self) -> Vector2<f64> {
        let sum = self
            .stations
            .iter()
            .fold(Vector2::<f64>::zeros(), |acc, s| acc + s.position);
        sum / self.stations.len() as f64
    }
}

/// Builds an [`ObservationSet`] from an [`Event`]
pub struct ObservationSetBuilder<'a, W: WeightPolicy> {
    config: &'a EngineConfig,
    policy: &'a W,
}

impl<'a, W: WeightPolicy> ObservationSetBuilder<'a, W> {
    pub fn new(config: &'a EngineConfig, policy: &'a W) -> Self {
        Self { config, policy }
    }

    pub fn build(&self, event: &Event) -> LocationResult<ObservationSet> {
        ensure_station_count(event.observations.len())?;

        // Canonical order: identical events solve identically regardless of input order
        let mut ordered: Vec<&Observation> = event.observations.iter().collect();
        ordered.sort_by(|a, b| {
            a.station_id
                .cmp(&b.station_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut accepted: Vec<(&Observation, f64)> = Vec::with_capacity(ordered.len());
        for observation in ordered {
            match self.check(observation, &accepted) {
                Ok(weight) => accepted.push((observation, weight)),
                Err(err) if self.config.drop_invalid_observations => {
                    warn!(device = %event.device_id, error = %err, "dropping observation");
                }
                Err(err) => return Err(err),
            }
        }

        ensure_station_count(accepted.len())?;

        let geo_points: Vec<_> = accepted.iter().map(|(o, _)| o.station_position()).collect();
        let projection = LocalProjection::centered_on(geo_points.iter())
            .ok_or(LocationError::InsufficientObservations {
                available: 0,
                required: MIN_STATIONS,
            })?;

        let stations: Vec<StationFix> = accepted
            .iter()
            .zip(geo_points.iter())
            .map(|((observation, weight), point)| StationFix {
                station_id: observation.station_id.clone(),
                position: projection.to_local(point),
                timestamp: observation.timestamp,
                weight: *weight,
            })
            .collect();

        let positions: Vec<Vector2<f64>> = stations.iter().map(|s| s.position).collect();
        let spread = check_station_geometry(&positions, &self.config.geometry)?;
        let plate_carree: Vec<Vector2<f64>> = geo_points
            .iter()
            .map(|point| projection.to_equirectangular(point))
            .collect();
        check_coordinate_alignment(&plate_carree, &self.config.geometry)?;

        let reference = select_reference(&stations);
        let range_differences = self.range_differences(&stations, reference);

        debug!(
            device = %event.device_id,
            sequence = event.sequence_no,
            stations = stations.len(),
            reference = %stations[reference].station_id,
            "observation set built"
        );

        Ok(ObservationSet {
            projection,
            stations,
            reference,
            range_differences,
            spread,
        })
    }

    fn check(&self, observation: &Observation, accepted: &[(&Observation, f64)]) -> LocationResult<f64> {
        validate_observation(observation)?;

        if accepted
            .iter()
            .any(|(other, _)| other.station_id == observation.station_id)
        {
            return Err(LocationError::invalid(
                &observation.station_id,
                "duplicate station identifier in event",
            ));
        }

        let weight = self.policy.weight(observation);
        if !weight.is_finite() || weight <= 0.0 {
            return Err(LocationError::invalid(
                &observation.station_id,
                format!("weight {} is not a finite positive number", weight),
            ));
        }

        Ok(weight)
    }

    fn range_differences(&self, stations: &[StationFix], reference: usize) -> Vec<RangeDifference> {
        let reference_fix = &stations[reference];
        let resolution = self.config.time_resolution;

        stations
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != reference)
            .map(|(index, fix)| {
                // Reference is the earliest arrival, so the difference is non-negative
                let ticks = fix.timestamp - reference_fix.timestamp;
                RangeDifference {
                    station: index,
                    meters: SPEED_OF_LIGHT_M_S * resolution.to_seconds(ticks),
                    weight: pair_weight(fix.weight, reference_fix.weight),
                }
            })
            .collect()
    }
}

fn ensure_station_count(available: usize) -> LocationResult<()> {
    if available < MIN_STATIONS {
        Err(LocationError::InsufficientObservations {
            available,
            required: MIN_STATIONS,
        })
    } else {
        Ok(())
    }
}

/// Earliest arrival wins; ties go to the lexicographically lowest station id
fn select_reference(stations: &[StationFix]) -> usize {
    stations
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.station_id.cmp(&b.station_id))
        })
        .map(|(index, _)| index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::weighting::{UniformWeight, WeightingScheme};
    use crate::validation::error::GeometryIssue;
    use approx::assert_relative_eq;

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
    fn test_builds_range_differences_against_earliest_station() {
        let config = EngineConfig::default();
        let set = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&worked_example())
            .unwrap();

        assert_eq!(set.stations().len(), 3);
        assert_eq!(set.reference().station_id, "FF250C00010001A8");
        assert_eq!(set.range_differences().len(), 2);

        // Stations are stored sorted by id: A7, A8, A9
        let a7 = set.range_differences().iter().find(|d| d.station == 0).unwrap();
        assert_relative_eq!(a7.meters, SPEED_OF_LIGHT_M_S * (49534.0 - 29563.0) * 1e-9, max_relative = 1e-12);
        assert_relative_eq!(a7.weight, 0.5);
    }

    #[test]
    fn test_fewer_than_three_observations() {
        let mut event = worked_example();
        event.observations.truncate(2);

        let config = EngineConfig::default();
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert_eq!(err, LocationError::InsufficientObservations { available: 2, required: 3 });
    }

    #[test]
    fn test_invalid_latitude_fails_fast() {
        let mut event = worked_example();
        event.observations[1].station_lat = 123.0;

        let config = EngineConfig::default();
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert!(matches!(err, LocationError::InvalidObservation { ref station_id, .. } if station_id == "FF250C00010001A9"));
    }

    #[test]
    fn test_dropping_invalid_leaves_too_few_stations() {
        let mut event = worked_example();
        event.observations[1].station_lng = f64::NAN;

        let config = EngineConfig {
            drop_invalid_observations: true,
            ..EngineConfig::default()
        };
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert_eq!(err, LocationError::InsufficientObservations { available: 2, required: 3 });
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let mut event = worked_example();
        event.observations.push(Observation::new(
            "FF250C00010001A8",
            29600,
            0.0,
            0.0,
            43.128362,
            -70.742126,
        ));

        let config = EngineConfig::default();
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert!(matches!(err, LocationError::InvalidObservation { .. }));

        // When dropping, the earliest report of the station is kept
        let config = EngineConfig {
            drop_invalid_observations: true,
            ..EngineConfig::default()
        };
        let set = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap();
        assert_eq!(set.stations().len(), 3);
        assert_eq!(set.reference().timestamp, 29563);
    }

    #[test]
    fn test_collinear_stations_rejected() {
        let event = Event::new(
            "dev",
            0,
            0,
            0,
            vec![
                Observation::new("a", 100, 0.0, 0.0, 43.00, -70.80),
                Observation::new("b", 200, 0.0, 0.0, 43.05, -70.80),
                Observation::new("c", 300, 0.0, 0.0, 43.10, -70.80),
            ],
        );

        let config = EngineConfig::default();
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert!(matches!(
            err,
            LocationError::DegenerateGeometry { issue: GeometryIssue::Collinear, .. }
        ));
    }

    #[test]
    fn test_parallel_of_latitude_rejected() {
        // Not a great circle, so the projected stations are not exactly collinear
        let event = Event::new(
            "dev",
            0,
            0,
            0,
            vec![
                Observation::new("a", 100, 0.0, 0.0, 43.0, -71.1),
                Observation::new("b", 200, 0.0, 0.0, 43.0, -70.8),
                Observation::new("c", 300, 0.0, 0.0, 43.0, -70.5),
            ],
        );

        let config = EngineConfig::default();
        let err = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap_err();
        assert!(matches!(
            err,
            LocationError::DegenerateGeometry { issue: GeometryIssue::Collinear, .. }
        ));
    }

    #[test]
    fn test_reference_tie_break_is_lowest_id() {
        let event = Event::new(
            "dev",
            0,
            0,
            0,
            vec![
                Observation::new("gw-c", 500, 0.0, 0.0, 43.10, -70.90),
                Observation::new("gw-b", 500, 0.0, 0.0, 43.00, -70.80),
                Observation::new("gw-a", 900, 0.0, 0.0, 43.12, -70.74),
            ],
        );

        let config = EngineConfig::default();
        let set = ObservationSetBuilder::new(&config, &UniformWeight)
            .build(&event)
            .unwrap();
        assert_eq!(set.reference().station_id, "gw-b");
    }

    #[test]
    fn test_snr_weights_flow_into_rows() {
        let mut event = worked_example();
        event.observations[0].snr = 10.0;

        let config = EngineConfig::default();
        let policy = WeightingScheme::Snr { scale_db: 10.0 };
        let set = ObservationSetBuilder::new(&config, &policy).build(&event).unwrap();

        assert_relative_eq!(set.reference().weight, 1.0_f64.exp());
        for row in set.range_differences() {
            assert_relative_eq!(row.weight, pair_weight(1.0, 1.0_f64.exp()));
        }
    }
}
