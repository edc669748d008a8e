//! Small numeric helpers shared by the fusion and retention stages.
//!
//! Everything here is a pure function over fixed-size inputs. Distances are
//! computed in f64 even for f32 inputs so that threshold comparisons do not
//! lose precision on near-boundary samples.

use std::time::{SystemTime, UNIX_EPOCH};

/// Standard atmosphere pressure at sea level, hPa.
const PRESSURE_STANDARD_ATMOSPHERE: f32 = 1013.25;

/// Mean earth radius in meters, used for great-circle distances.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Multiply two 3x3 matrices given in row-major order: `a * b`.
pub fn mat3_mul(a: &[f32; 9], b: &[f32; 9]) -> [f32; 9] {
    [
        a[0] * b[0] + a[1] * b[3] + a[2] * b[6],
        a[0] * b[1] + a[1] * b[4] + a[2] * b[7],
        a[0] * b[2] + a[1] * b[5] + a[2] * b[8],
        a[3] * b[0] + a[4] * b[3] + a[5] * b[6],
        a[3] * b[1] + a[4] * b[4] + a[5] * b[7],
        a[3] * b[2] + a[4] * b[5] + a[5] * b[8],
        a[6] * b[0] + a[7] * b[3] + a[8] * b[6],
        a[6] * b[1] + a[7] * b[4] + a[8] * b[7],
        a[6] * b[2] + a[7] * b[5] + a[8] * b[8],
    ]
}

/// The identity 3x3 matrix in row-major order.
pub fn mat3_identity() -> [f32; 9] {
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

fn sq(v: f64) -> f64 {
    v * v
}

/// Euclidean distance between two points in the plane.
pub fn distance2(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (sq(x1 - x2) + sq(y1 - y2)).sqrt()
}

/// Euclidean distance between two three-component vectors.
pub fn distance3(a: &[f32; 3], b: &[f32; 3]) -> f64 {
    distance_n(a, b)
}

/// Euclidean distance between two vectors of equal dimension.
pub fn distance_n(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| sq((p - q) as f64))
        .sum::<f64>()
        .sqrt()
}

/// Great-circle (haversine) distance in meters between two WGS-84
/// coordinates given in degrees.
pub fn earth_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = sq((dlat / 2.0).sin())
        + lat1.to_radians().cos() * lat2.to_radians().cos() * sq((dlon / 2.0).sin());
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Convert an atmospheric pressure reading (hPa) to an altitude above sea
/// level in meters, assuming the standard atmosphere at sea level.
pub fn altitude_from_pressure(pressure_hpa: f32) -> f32 {
    44_330.0 * (1.0 - (pressure_hpa / PRESSURE_STANDARD_ATMOSPHERE).powf(1.0 / 5.255))
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
