use crate::error::DispatchError;
use crate::models::courier::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters via the haversine formula.
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

/// Callers must reject out-of-range coordinates before computing
/// distances; haversine on garbage input yields garbage, not an error.
pub fn validate_coords(lat: f64, lng: f64) -> Result<(), DispatchError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(DispatchError::Validation(format!(
            "latitude {lat} out of range [-90, 90]"
        )));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(DispatchError::Validation(format!(
            "longitude {lng} out of range [-180, 180]"
        )));
    }
    Ok(())
}
