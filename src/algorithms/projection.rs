//! Geodetic <-> local Cartesian conversion
//!
//! Spherical azimuthal-equidistant projection centred on the station cluster.
//! Distances and bearings from the centre are exact; distortion elsewhere
//! grows with (d/R)², i.e. centimetres over a cluster tens of kilometres wide.

use crate::core::{GeoPoint, EARTH_MEAN_RADIUS_M};
use nalgebra::Vector2;

/// Angular distance below which the projection collapses onto its centre (rad)
const CENTER_EPSILON_RAD: f64 = 1e-15;

/// Local tangent-plane frame: x east, y north, metres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    center: GeoPoint,
    sin_lat_c: f64,
    cos_lat_c: f64,
}

impl LocalProjection {
    pub fn new(center: GeoPoint) -> Self {
        let lat_c = center.lat.to_radians();
        Self {
            center,
            sin_lat_c: lat_c.sin(),
            cos_lat_c: lat_c.cos(),
        }
    }

    /// Centre on the [`geographic_mean`] of `points`
    pub fn centered_on<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        geographic_mean(points).map(Self::new)
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn to_local(&self, point: &GeoPoint) -> Vector2<f64> {
        let lat = point.lat.to_radians();
        let dlng = (point.lng - self.center.lng).to_radians();
        let dlat = lat - self.center.lat.to_radians();

        // Haversine form keeps the angular distance accurate near the centre
        let h = (dlat / 2.0).sin().powi(2) + self.cos_lat_c * lat.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * h.sqrt().min(1.0).asin();
        let k = if c < 1e-12 { 1.0 } else { c / c.sin() };

        let x = k * lat.cos() * dlng.sin();
        let y = k * (self.cos_lat_c * lat.sin() - self.sin_lat_c * lat.cos() * dlng.cos());

        Vector2::new(x * EARTH_MEAN_RADIUS_M, y * EARTH_MEAN_RADIUS_M)
    }

    /// Plate-carrée offsets from the centre (metres east, metres north).
    ///
    /// Points on a parallel, a meridian or any constant-slope line in
    /// latitude/longitude stay exactly collinear here.
    pub fn to_equirectangular(&self, point: &GeoPoint) -> Vector2<f64> {
        let dlng = normalize_longitude(point.lng - self.center.lng).to_radians();
        let dlat = (point.lat - self.center.lat).to_radians();
        Vector2::new(
            dlng * self.cos_lat_c * EARTH_MEAN_RADIUS_M,
            dlat * EARTH_MEAN_RADIUS_M,
        )
    }

    pub fn to_geodetic(&self, local: &Vector2<f64>) -> GeoPoint {
        let x = local.x / EARTH_MEAN_RADIUS_M;
        let y = local.y / EARTH_MEAN_RADIUS_M;
        let c = x.hypot(y);

        if c < CENTER_EPSILON_RAD {
            return self.center;
        }

        let (sin_c, cos_c) = c.sin_cos();
        let lat = (cos_c * self.sin_lat_c + y * sin_c * self.cos_lat_c / c)
            .clamp(-1.0, 1.0)
            .asin();
        let dlng = (x * sin_c).atan2(c * self.cos_lat_c * cos_c - y * self.sin_lat_c * sin_c);

        GeoPoint::new(
            lat.to_degrees(),
            normalize_longitude(self.center.lng + dlng.to_degrees()),
        )
    }
}

/// Wrap a longitude into [-180, 180].
///
/// Both ends of the range name the antimeridian; the sign of the input picks
/// which one, so `180.0` and `540.0` stay at `180.0` while `-180.0` stays at
/// `-180.0`.
pub fn normalize_longitude(lng: f64) -> f64 {
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Mean position of `points`: arithmetic mean latitude and circular mean
/// longitude, so clusters straddling the antimeridian stay together.
///
/// `None` for an empty input.
pub fn geographic_mean<'a, I>(points: I) -> Option<GeoPoint>
where
    I: IntoIterator<Item = &'a GeoPoint>,
{
    let mut count = 0usize;
    let mut lat_sum = 0.0;
    let mut sin_sum = 0.0;
    let mut cos_sum = 0.0;

    for point in points {
        count += 1;
        lat_sum += point.lat;
        let lng = point.lng.to_radians();
        sin_sum += lng.sin();
        cos_sum += lng.cos();
    }

    if count == 0 {
        return None;
    }

    let lat = lat_sum / count as f64;
    let lng = sin_sum.atan2(cos_sum).to_degrees();
    Some(GeoPoint::new(lat, lng))
}

/// Great-circle distance on the mean-radius sphere (metres)
pub fn great_circle_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}
