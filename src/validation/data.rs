use crate::core::Observation;
use crate::validation::error::{LocationError, LocationResult};
use tracing::warn;

/// Check an observation against its declared bounds
pub fn validate_observation(observation: &Observation) -> LocationResult<()> {
    let station = observation.station_id.as_str();

    if station.trim().is_empty() {
        return Err(LocationError::invalid(station, "empty station identifier"));
    }

    let lat = observation.station_lat;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(LocationError::invalid(
            station,
            format!("latitude {} outside [-90, 90]", lat),
        ));
    }

    let lng = observation.station_lng;
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(LocationError::invalid(
            station,
            format!("longitude {} outside [-180, 180]", lng),
        ));
    }

    if !observation.rssi.is_finite() || !observation.snr.is_finite() {
        return Err(LocationError::invalid(station, "non-finite signal quality"));
    }

    // Counters beyond 2^53 ticks cannot be represented exactly in f64
    if observation.timestamp > (1u64 << 53) {
        return Err(LocationError::invalid(
            station,
            format!("timestamp {} exceeds the representable range", observation.timestamp),
        ));
    }

    Ok(())
}

/// Device and station EUIs are 16 hexadecimal digits
pub fn is_valid_eui(eui: &str) -> bool {
    eui.len() == 16 && eui.chars().all(|c| c.is_ascii_hexdigit())
}

/// Split a comma-separated EUI list, keeping only well-formed entries
pub fn parse_eui_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|eui| !eui.is_empty())
        .filter(|eui| {
            let valid = is_valid_eui(eui);
            if !valid {
                warn!(eui = %eui, "ignoring malformed EUI");
            }
            valid
        })
        .map(str::to_string)
        .collect()
}
