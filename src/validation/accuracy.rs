//! Accuracy evaluation against ground truth
//!
//! Buckets the great-circle error of each solved event into fixed distance
//! bands and keeps running mean and maximum.

use crate::algorithms::projection::great_circle_distance_m;
use crate::core::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bounds of the error bands (metres); the last band is open-ended
pub const ERROR_BANDS_M: [f64; 4] = [50.0, 100.0, 200.0, 500.0];

/// Error distribution over a batch of estimates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    /// Counts per band: ≤50, ≤100, ≤200, ≤500, >500 m
    pub band_counts: [usize; 5],
    pub total: usize,
    pub mean_error_m: f64,
    pub max_error_m: f64,
    error_sum_m: f64,
}

impl AccuracyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a report from `(estimate, truth)` pairs
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a GeoPoint, &'a GeoPoint)>,
    {
        let mut report = Self::new();
        for (estimate, truth) in pairs {
            report.record(estimate, truth);
        }
        report
    }

    /// Add one estimate; returns its error in metres
    pub fn record(&mut self, estimate: &GeoPoint, truth: &GeoPoint) -> f64 {
        let error = great_circle_distance_m(estimate, truth);
        self.record_error(error);
        error
    }

    pub fn record_error(&mut self, error_m: f64) {
        let band = ERROR_BANDS_M
            .iter()
            .position(|bound| error_m <= *bound)
            .unwrap_or(ERROR_BANDS_M.len());

        self.band_counts[band] += 1;
        self.total += 1;
        self.error_sum_m += error_m;
        self.mean_error_m = self.error_sum_m / self.total as f64;
        self.max_error_m = self.max_error_m.max(error_m);
    }

    /// Share of estimates in each band, in percent
    pub fn percentages(&self) -> [f64; 5] {
        let mut result = [0.0; 5];
        if self.total == 0 {
            return result;
        }
        for (slot, count) in result.iter_mut().zip(self.band_counts.iter()) {
            *slot = *count as f64 * 100.0 / self.total as f64;
        }
        result
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LABELS: [&str; 5] = ["<= 50 m", "50-100 m", "100-200 m", "200-500 m", "> 500 m"];

        writeln!(f, "Located events: {}", self.total)?;
        for ((label, count), pct) in LABELS
            .iter()
            .zip(self.band_counts.iter())
            .zip(self.percentages().iter())
        {
            writeln!(f, "  {:>10}: {:>6} ({:>6.2}%)", label, count, pct)?;
        }
        write!(
            f,
            "Mean error: {:.1} m, max error: {:.1} m",
            self.mean_error_m, self.max_error_m
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_band_boundaries() {
        let mut report = AccuracyReport::new();
        for error in [0.0, 50.0, 50.1, 100.0, 150.0, 200.0, 499.9, 500.0, 500.1, 10_000.0] {
            report.record_error(error);
        }

        assert_eq!(report.band_counts, [2, 2, 2, 2, 2]);
        assert_eq!(report.total, 10);
        assert_relative_eq!(report.max_error_m, 10_000.0);
        assert_eq!(report.percentages(), [20.0; 5]);
    }

    #[test]
    fn test_mean_from_geodetic_pairs() {
        let truth = GeoPoint::new(43.0, -70.8);
        // One degree of latitude on the mean sphere
        let far = GeoPoint::new(44.0, -70.8);

        let report = AccuracyReport::from_pairs([(&truth, &truth), (&far, &truth)]);
        assert_eq!(report.band_counts, [1, 0, 0, 0, 1]);
        assert_relative_eq!(report.max_error_m, 111_194.9266, epsilon = 1e-3);
        assert_relative_eq!(report.mean_error_m, 111_194.9266 / 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_empty_report() {
        let report = AccuracyReport::new();
        assert_eq!(report.percentages(), [0.0; 5]);
        assert!(report.to_string().starts_with("Located events: 0"));
    }
}
