//! Grouping of flat uplink records into events
//!
//! Stations report each reception as an independent record. Records of one
//! device sharing a sequence number form a single transmission event.

use crate::core::{Event, GeoPoint, Observation, DEFAULT_MAX_EVENT_SPREAD_TICKS, MIN_STATIONS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One station's reception of one uplink, as stored by the network server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkRecord {
    pub device_id: String,
    pub station_id: String,
    pub sequence_no: u32,
    #[serde(alias = "timestamp_ns", alias = "timestamp_us")]
    pub timestamp: u64,
    pub station_lat: f64,
    pub station_lng: f64,
    #[serde(default)]
    pub rssi: f64,
    #[serde(default)]
    pub snr: f64,
    /// Ground-truth device position, when the device reports one
    #[serde(default)]
    pub device_lat: Option<f64>,
    #[serde(default)]
    pub device_lng: Option<f64>,
}

impl UplinkRecord {
    fn has_station_position(&self) -> bool {
        self.station_lat.is_finite()
            && self.station_lng.is_finite()
            && self.station_lat != 0.0
            && self.station_lng != 0.0
    }

    fn ground_truth(&self) -> Option<GeoPoint> {
        match (self.device_lat, self.device_lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }

    fn to_observation(&self) -> Observation {
        Observation::new(
            self.station_id.clone(),
            self.timestamp,
            self.rssi,
            self.snr,
            self.station_lat,
            self.station_lng,
        )
    }
}

/// An event ready for the engine, with the device's reported position
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledEvent {
    pub event: Event,
    pub ground_truth: Option<GeoPoint>,
}

/// Bookkeeping of one assembly pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    /// Distinct sequence numbers seen for the device
    pub total_events: usize,
    /// Events left with fewer than the minimum number of stations
    pub skipped_events: usize,
    pub missing_position_records: usize,
    pub stale_records: usize,
    pub duplicate_location_records: usize,
}

impl AssemblyStats {
    pub fn usable_events(&self) -> usize {
        self.total_events - self.skipped_events
    }
}

/// Result of [`EventAssembler::assemble`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembly {
    pub events: Vec<AssembledEvent>,
    pub stats: AssemblyStats,
}

/// Groups uplink records by sequence number
#[derive(Debug, Clone, Copy)]
pub struct EventAssembler {
    max_event_spread_ticks: u64,
}

impl Default for EventAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENT_SPREAD_TICKS)
    }
}

impl EventAssembler {
    pub fn new(max_event_spread_ticks: u64) -> Self {
        Self {
            max_event_spread_ticks,
        }
    }

    /// Build the events of `device_id` from `records`, ordered by sequence number
    pub fn assemble(&self, device_id: &str, records: &[UplinkRecord]) -> Assembly {
        let mut stats = AssemblyStats::default();
        let mut groups: BTreeMap<u32, Vec<&UplinkRecord>> = BTreeMap::new();

        for record in records.iter().filter(|r| r.device_id.eq_ignore_ascii_case(device_id)) {
            groups.entry(record.sequence_no).or_default().push(record);
        }
        stats.total_events = groups.len();

        let mut events = Vec::new();
        for (sequence_no, mut group) in groups {
            group.sort_by_key(|r| r.timestamp);

            let accepted = self.select(&group, &mut stats);
            if accepted.len() < MIN_STATIONS {
                debug!(device = %device_id, sequence = sequence_no, stations = accepted.len(), "skipping event");
                stats.skipped_events += 1;
                continue;
            }

            let ground_truth = accepted.iter().find_map(|r| r.ground_truth());
            let observations = accepted.iter().map(|r| r.to_observation()).collect();
            events.push(AssembledEvent {
                event: Event::new(device_id, 0, sequence_no, 0, observations),
                ground_truth,
            });
        }

        info!(
            device = %device_id,
            events = stats.total_events,
            usable = stats.usable_events(),
            "records assembled"
        );

        Assembly { events, stats }
    }

    fn select<'r>(&self, group: &[&'r UplinkRecord], stats: &mut AssemblyStats) -> Vec<&'r UplinkRecord> {
        let mut accepted: Vec<&UplinkRecord> = Vec::with_capacity(group.len());
        let mut first_timestamp: Option<u64> = None;

        for record in group {
            if !record.has_station_position() {
                stats.missing_position_records += 1;
                continue;
            }

            let first = *first_timestamp.get_or_insert(record.timestamp);
            if record.timestamp.abs_diff(first) > self.max_event_spread_ticks {
                stats.stale_records += 1;
                continue;
            }

            let same_location = accepted.iter().any(|other| {
                other.station_lat == record.station_lat && other.station_lng == record.station_lng
            });
            if same_location {
                stats.duplicate_location_records += 1;
                continue;
            }

            accepted.push(record);
        }

        accepted
    }
}
