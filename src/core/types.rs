//! Core data types for the geolocation engine

use serde::{Deserialize, Serialize};

/// Geodetic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// One station's report of a single transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Arrival counter in ticks of the engine's `TimeResolution`
    #[serde(alias = "timestamp_us", alias = "timestamp_ns")]
    pub timestamp: u64,
    /// Received signal strength (dBm)
    #[serde(default)]
    pub rssi: f64,
    /// Signal-to-noise ratio (dB)
    #[serde(default)]
    pub snr: f64,
    pub station_id: String,
    pub station_lat: f64,
    pub station_lng: f64,
}

impl Observation {
    pub fn new(
        station_id: impl Into<String>,
        timestamp: u64,
        rssi: f64,
        snr: f64,
        station_lat: f64,
        station_lng: f64,
    ) -> Self {
        Self {
            timestamp,
            rssi,
            snr,
            station_id: station_id.into(),
            station_lat,
            station_lng,
        }
    }

    pub fn station_position(&self) -> GeoPoint {
        GeoPoint::new(self.station_lat, self.station_lng)
    }
}

/// A transmission heard by one or more stations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub device_id: String,
    #[serde(default)]
    pub join_id: u32,
    #[serde(default)]
    pub sequence_no: u32,
    #[serde(default)]
    pub datarate_index: u8,
    pub observations: Vec<Observation>,
}

impl Event {
    pub fn new(
        device_id: impl Into<String>,
        join_id: u32,
        sequence_no: u32,
        datarate_index: u8,
        observations: Vec<Observation>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            join_id,
            sequence_no,
            datarate_index,
            observations,
        }
    }

    pub fn station_count(&self) -> usize {
        self.observations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserializes_wire_shape() {
        let json = r#"
        {
          "device_id": "00000000FFFFFFFF",
          "join_id": 7,
          "sequence_no": 12,
          "datarate_index": 3,
          "observations": [
            { "timestamp_us": 29563, "rssi": -101.0, "snr": 7.5,
              "station_id": "FF250C00010001A8",
              "station_lat": 43.128362, "station_lng": -70.742126 }
          ]
        }
        "#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.join_id, 7);
        assert_eq!(event.sequence_no, 12);
        assert_eq!(event.station_count(), 1);
        assert_eq!(event.observations[0].timestamp, 29563);
        assert_eq!(event.observations[0].station_id, "FF250C00010001A8");
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(90.0, -180.0).is_valid());
        assert!(!GeoPoint::new(90.5, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 180.1).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }
}
