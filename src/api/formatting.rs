//! Result output formatting
//!
//! Human-readable text for the command line, JSON for downstream tools, and
//! the marker/pin layout consumed by the map viewer.

use crate::api::engine::SolveResult;
use crate::core::{GeoPoint, Observation};
use crate::processing::filter::FilteredLocation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Marker colours understood by the map viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerColor {
    /// Receiving station
    Red,
    /// Individual estimate
    Blue,
    /// Filtered estimate
    Yellow,
    /// Reported device position
    Green,
}

impl MarkerColor {
    /// Drawing order; higher values are drawn on top
    pub fn z_index(self) -> i32 {
        match self {
            MarkerColor::Red => 50,
            MarkerColor::Blue => -1,
            MarkerColor::Yellow | MarkerColor::Green => 100,
        }
    }
}

/// A single map pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub color: MarkerColor,
    #[serde(rename = "zIndex")]
    pub z_index: i32,
}

impl MapMarker {
    pub fn new(position: GeoPoint, name: impl Into<String>, color: MarkerColor) -> Self {
        Self {
            lat: position.lat,
            lng: position.lng,
            name: name.into(),
            color,
            z_index: color.z_index(),
        }
    }

    pub fn station(observation: &Observation) -> Self {
        Self::new(observation.station_position(), observation.station_id.clone(), MarkerColor::Red)
    }

    pub fn estimate(result: &SolveResult, name: impl Into<String>) -> Self {
        Self::new(result.position(), name, MarkerColor::Blue)
    }
}

/// Pin collection written for the map viewer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinData {
    pub locations: Vec<MapMarker>,
}

impl PinData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, marker: MapMarker) {
        self.locations.push(marker);
    }

    /// Add a station marker unless one with the same name exists
    pub fn add_station(&mut self, observation: &Observation) {
        let known = self
            .locations
            .iter()
            .any(|m| m.color == MarkerColor::Red && m.name == observation.station_id);
        if !known {
            self.push(MapMarker::station(observation));
        }
    }

    /// Filtered centroid and the reported device position
    pub fn add_filtered(&mut self, filtered: &FilteredLocation) {
        self.push(MapMarker::new(filtered.centroid, "Calc", MarkerColor::Yellow));
        self.push(MapMarker::new(filtered.truth, "Actual", MarkerColor::Green));
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::from)?;
        fs::write(path, json)
    }
}

/// Plain-text rendering of a solve result
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter {
    /// Single-line output
    pub compact: bool,
    /// Append the per-iteration trace when present
    pub include_trace: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_text(&self, result: &SolveResult) -> String {
        if self.compact {
            return format!(
                "{:.6}, {:.6} ({} stations, {} iterations, residual {:.2} m)",
                result.latitude,
                result.longitude,
                result.station_count,
                result.iterations,
                result.residual_norm
            );
        }

        let mut output = String::new();
        output.push_str("Position:\n");
        output.push_str(&format!("  Latitude:  {:.6}°\n", result.latitude));
        output.push_str(&format!("  Longitude: {:.6}°\n", result.longitude));
        output.push_str("Solve:\n");
        output.push_str(&format!("  Stations:   {}\n", result.station_count));
        output.push_str(&format!("  Reference:  {}\n", result.reference_station));
        output.push_str(&format!("  Iterations: {}\n", result.iterations));
        output.push_str(&format!("  Residual:   {:.3} m\n", result.residual_norm));

        if self.include_trace && !result.trace.is_empty() {
            output.push_str("Trace:\n");
            for record in &result.trace {
                output.push_str(&format!(
                    "  #{:<3} start {} x={:>12.2} m  y={:>12.2} m  step={:>10.3} m  residual={:.3} m  damping={:.0e}{}\n",
                    record.iteration,
                    record.start,
                    record.x_m,
                    record.y_m,
                    record.step_m,
                    record.residual_norm,
                    record.damping,
                    if record.accepted { "" } else { "  rejected" }
                ));
            }
        }

        output
    }
}

/// JSON rendering of a solve result
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, result: &SolveResult) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(result)
        } else {
            serde_json::to_string(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::taylor_series::IterationRecord;

    fn result() -> SolveResult {
        SolveResult {
            latitude: 43.054159,
            longitude: -70.781961,
            iterations: 4,
            residual_norm: 0.01,
            reference_station: "FF250C00010001A8".to_string(),
            station_count: 3,
            trace: vec![IterationRecord {
                start: 0,
                iteration: 1,
                x_m: 6000.0,
                y_m: -1200.0,
                step_m: 6100.0,
                residual_norm: 900.0,
                damping: 0.0,
                accepted: true,
            }],
        }
    }

    #[test]
    fn test_marker_wire_shape() {
        let marker = MapMarker::new(GeoPoint::new(43.1, -70.7), "FF250C00010001A8", MarkerColor::Red);
        let json = serde_json::to_value(&marker).unwrap();

        assert_eq!(json["color"], "red");
        assert_eq!(json["zIndex"], 50);
        assert_eq!(json["name"], "FF250C00010001A8");
        assert_eq!(json["lat"], 43.1);
    }

    #[test]
    fn test_pin_data_deduplicates_stations() {
        let observation = Observation::new("gw-a", 10, 0.0, 0.0, 43.128362, -70.742126);
        let mut pins = PinData::new();
        pins.add_station(&observation);
        pins.add_station(&observation);
        pins.push(MapMarker::estimate(&result(), "Estimate"));

        assert_eq!(pins.locations.len(), 2);
        assert_eq!(pins.locations[1].color, MarkerColor::Blue);
        assert_eq!(pins.locations[1].z_index, -1);

        let json: serde_json::Value = serde_json::from_str(&pins.to_json().unwrap()).unwrap();
        assert_eq!(json["locations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_filtered_markers() {
        let filtered = FilteredLocation {
            centroid: GeoPoint::new(43.0, -70.8),
            truth: GeoPoint::new(43.0001, -70.8),
            retained: 10,
            error_m: 11.1,
        };
        let mut pins = PinData::new();
        pins.add_filtered(&filtered);

        assert_eq!(pins.locations[0].color, MarkerColor::Yellow);
        assert_eq!(pins.locations[1].color, MarkerColor::Green);
        assert!(pins.locations.iter().all(|m| m.z_index == 100));
    }

    #[test]
    fn test_text_output() {
        let full = TextFormatter { compact: false, include_trace: true }.format_text(&result());
        assert!(full.contains("Latitude:  43.054159°"));
        assert!(full.contains("Reference:  FF250C00010001A8"));
        assert!(full.contains("Trace:"));
        assert!(full.contains("#1   start 0"));
        assert!(!full.contains("rejected"));

        let compact = TextFormatter { compact: true, include_trace: false }.format_text(&result());
        assert!(compact.starts_with("43.054159, -70.781961"));
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_json_output() {
        let json = JsonFormatter::new().format_json(&result()).unwrap();
        let restored: SolveResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, result());
    }
}
