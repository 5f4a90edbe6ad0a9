//! Great-circle helpers for direct-line estimates and radius prefilters.

use crate::domain::Coordinates;

/// Mean Earth radius used by every distance computation, in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in metres.
///
/// # Examples
/// ```
/// use nearby_backend::domain::Coordinates;
/// use nearby_backend::domain::nearby::geo::haversine_m;
///
/// let a = Coordinates::new(0.0, 0.0).expect("valid");
/// let b = Coordinates::new(0.0, 1.0).expect("valid");
/// assert!((haversine_m(a, b) - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_m(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Direct-line distance and walking-time estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    /// Rounded great-circle distance in metres.
    pub distance_m: u64,
    /// Rounded duration in seconds at the assumed speed.
    pub duration_s: u64,
}

/// Estimate distance and duration between two points.
///
/// Duration is `distance / speed` rounded to the nearest second; a
/// non-positive or non-finite speed yields a duration equal to the distance.
pub fn estimate(origin: Coordinates, target: Coordinates, speed_mps: f64) -> Estimate {
    let distance = haversine_m(origin, target);
    let duration = if speed_mps.is_finite() && speed_mps > 0.0 {
        distance / speed_mps
    } else {
        distance
    };
    Estimate {
        distance_m: distance.round() as u64,
        duration_s: duration.round() as u64,
    }
}

/// Latitude/longitude rectangle enclosing a search circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

impl BoundingBox {
    /// Rectangle containing every point within `radius_m` of `center`.
    ///
    /// Near the poles, or when the circle crosses the antimeridian, the
    /// longitude span widens to the full range.
    pub fn around(center: Coordinates, radius_m: f64) -> Self {
        let radius_m = radius_m.max(0.0);
        let d_lat = (radius_m / EARTH_RADIUS_M).to_degrees();
        let min_lat = (center.lat - d_lat).max(-90.0);
        let max_lat = (center.lat + d_lat).min(90.0);

        let cos_lat = center.lat.to_radians().cos();
        let (min_lng, max_lng) = if min_lat <= -90.0 || max_lat >= 90.0 || cos_lat <= f64::EPSILON {
            (-180.0, 180.0)
        } else {
            let d_lng = d_lat / cos_lat;
            let west = center.lng - d_lng;
            let east = center.lng + d_lng;
            if west < -180.0 || east > 180.0 {
                (-180.0, 180.0)
            } else {
                (west, east)
            }
        };

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// Whether `point` lies inside the rectangle.
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}
