//! Physical constants and fixed system parameters

/// Propagation speed of the radio signal (m/s)
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Mean Earth radius used by the spherical projection (m)
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_000.0;

/// Minimum number of stations for a determined 2D solve
pub const MIN_STATIONS: usize = 3;

/// Maximum spread of arrival counters inside one event, in counter ticks
pub const DEFAULT_MAX_EVENT_SPREAD_TICKS: u64 = 200_000;
