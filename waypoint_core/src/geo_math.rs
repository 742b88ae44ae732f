//! Great-circle distance on a spherical earth.

use waypoint_env::Coordinate;

/// Mean earth radius used for every distance in the tracker (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
///
/// Symmetric, and exactly zero for identical points.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    // abs() keeps the result bit-for-bit symmetric in (a, b)
    let d_phi = (b.lat - a.lat).abs().to_radians();
    let d_lambda = (b.lng - a.lng).abs().to_radians();
    
    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    
    EARTH_RADIUS_M * c
}

/// Coordinate `meters` north of `origin` (used by tests and the simulator).
pub fn offset_north(origin: Coordinate, meters: f64) -> Coordinate {
    let d_lat = (meters / EARTH_RADIUS_M).to_degrees();
    Coordinate::new(origin.lat + d_lat, origin.lng)
}
