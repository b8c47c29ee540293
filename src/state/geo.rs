/// Mean earth radius in kilometers, per §4.1.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points on a sphere of radius 6371 km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Implied straight-line travel speed in km/h between two observations
/// `dt_sec` apart, clamping the elapsed time to at least 1 second so
/// co-located transactions in the same second never divide by zero (§8).
pub fn implied_speed_kmph(km: f64, dt_sec: i64) -> f64 {
    let dt = dt_sec.max(1) as f64;
    km / dt * 3600.0
}
