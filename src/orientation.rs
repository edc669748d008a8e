//! Orientation tracking from raw inertial samples.
//!
//! The engine integrates gyroscope rotation deltas on top of a reference
//! frame derived once from gravity and the geomagnetic field. Integration
//! alone drifts without bound; anchoring it to the accelerometer/
//! magnetometer frame keeps the absolute orientation honest while the
//! gyroscope provides the short-term responsiveness.
//!
//! The same engine owns the gravity / linear-acceleration split: an
//! exponential low-pass filter isolates gravity from the raw accelerometer
//! signal, and the remainder is the linear acceleration.

use crate::math;

/// Smoothing constant of the gravity low-pass filter.
const GRAVITY_ALPHA: f32 = 0.8;

/// Angular speeds below this (rad/s) are treated as measurement noise: the
/// sample is still integrated, but the axis is left unnormalized. Typical
/// gyroscope output spans 0 (at rest) to ~10 rad/s (rapid rotation), so 0.1
/// separates noise from real motion for most handsets.
const ROTATION_NOISE_EPSILON: f64 = 0.1;

/// Reference-frame construction rejects gravity/geomagnetic pairs whose
/// cross product is shorter than this (near-parallel vectors).
const MIN_CROSS_NORM: f32 = 0.1;

/// A rotation as a unit quaternion, `w` the scalar part.
#[derive(Debug, Clone, Copy)]
pub struct Quaternion {
    pub w: f32,
    pub xyz: [f32; 3],
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, xyz: [x, y, z] }
    }

    /// Identity quaternion (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// The rotation of `angle` radians around `axis` (assumed unit length).
    pub fn from_axis_angle(axis: [f32; 3], angle: f64) -> Self {
        let half = angle / 2.0;
        let sin_half = half.sin() as f32;
        Self::new(
            half.cos() as f32,
            sin_half * axis[0],
            sin_half * axis[1],
            sin_half * axis[2],
        )
    }

    /// The equivalent 3x3 rotation matrix in row-major order.
    pub fn to_rotation_matrix(&self) -> [f32; 9] {
        let w = self.w;
        let x = self.xyz[0];
        let y = self.xyz[1];
        let z = self.xyz[2];

        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
            2.0 * (x * y + w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - w * x),
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            1.0 - 2.0 * (x * x + y * y),
        ]
    }
}

/// The raw accelerometer triple split into its components.
///
/// Nine floats per sample: the untouched reading, the acceleration with
/// gravity removed, and the gravity estimate itself. Each triple feeds its
/// own retention channel downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSplit {
    /// The reading as delivered, m/s².
    pub raw: [f32; 3],
    /// Acceleration along each device axis with gravity removed, m/s².
    pub linear: [f32; 3],
    /// Low-pass gravity estimate, m/s².
    pub gravity: [f32; 3],
}

/// Gyroscope-integrated orientation calibrated against an accelerometer +
/// magnetometer reference frame.
pub struct OrientationEngine {
    /// Gravity estimate maintained by the low-pass filter.
    gravity: [f32; 3],
    /// Linear acceleration from the most recent accelerometer sample.
    linear: [f32; 3],
    /// Most recent raw accelerometer reading, if any.
    accel: Option<[f32; 3]>,
    /// Most recent geomagnetic reading, if any.
    geomagnetic: Option<[f32; 3]>,
    /// Running rotation matrix updated by every integrated gyro sample.
    current: [f32; 9],
    /// Reference frame captured once from gravity + geomagnetic vectors.
    initial: [f32; 9],
    /// Timestamp (ms) of the previous gyroscope sample.
    last_gyro_t: Option<i64>,
    has_reference: bool,
    integration_seeded: bool,
}

impl Default for OrientationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationEngine {
    pub fn new() -> Self {
        Self {
            gravity: [0.0; 3],
            linear: [0.0; 3],
            accel: None,
            geomagnetic: None,
            current: math::mat3_identity(),
            initial: math::mat3_identity(),
            last_gyro_t: None,
            has_reference: false,
            integration_seeded: false,
        }
    }

    /// Feed a raw accelerometer reading and get back its raw / linear /
    /// gravity split. Always succeeds; purely numeric.
    pub fn ingest_accelerometer(&mut self, raw: [f32; 3]) -> AccelSplit {
        for i in 0..3 {
            self.gravity[i] = GRAVITY_ALPHA * self.gravity[i] + (1.0 - GRAVITY_ALPHA) * raw[i];
            self.linear[i] = raw[i] - self.gravity[i];
        }
        self.accel = Some(raw);
        AccelSplit {
            raw,
            linear: self.linear,
            gravity: self.gravity,
        }
    }

    /// Feed a geomagnetic reading (µT along the device axes).
    pub fn ingest_magnetic(&mut self, values: [f32; 3]) {
        self.geomagnetic = Some(values);
    }

    /// Whether the accelerometer/magnetometer reference frame has been
    /// captured.
    pub fn has_reference(&self) -> bool {
        self.has_reference
    }

    /// Integrate one gyroscope sample (rad/s around each device axis).
    ///
    /// Returns the updated `(azimuth, pitch, roll)` orientation in radians,
    /// or `None` while the engine is still waiting for a reference frame or
    /// for a previous sample to measure `dt` against. Callers must treat a
    /// non-finite component in the result as a sample to discard.
    pub fn ingest_gyroscope(&mut self, t: i64, angular_velocity: [f32; 3]) -> Option<[f32; 3]> {
        if !self.has_reference {
            self.try_acquire_reference();
            if !self.has_reference {
                return None;
            }
        }
        if !self.integration_seeded {
            self.current = self.initial;
            self.integration_seeded = true;
        }

        let result = match self.last_gyro_t {
            None => None,
            Some(prev_t) => {
                let dt = (t - prev_t) as f64 / 1000.0;
                let [wx, wy, wz] = angular_velocity;
                let speed =
                    ((wx as f64) * (wx as f64) + (wy as f64) * (wy as f64) + (wz as f64) * (wz as f64))
                        .sqrt();
                let axis = if speed > ROTATION_NOISE_EPSILON {
                    [
                        (wx as f64 / speed) as f32,
                        (wy as f64 / speed) as f32,
                        (wz as f64 / speed) as f32,
                    ]
                } else {
                    angular_velocity
                };
                let delta = Quaternion::from_axis_angle(axis, speed * dt).to_rotation_matrix();
                self.current = math::mat3_mul(&self.current, &delta);
                Some(orientation_angles(&self.current))
            }
        };
        self.last_gyro_t = Some(t);
        result
    }

    /// Capture the reference frame once both input vectors have been seen.
    /// A degenerate pair leaves the engine unchanged; the next gyroscope
    /// sample retries with fresher vectors.
    fn try_acquire_reference(&mut self) {
        if let (Some(accel), Some(geomagnetic)) = (self.accel, self.geomagnetic) {
            if let Some(reference) = reference_matrix(&accel, &geomagnetic) {
                self.initial = reference;
                self.has_reference = true;
            }
        }
    }
}

/// Derive the device rotation matrix from a gravity vector and a
/// geomagnetic vector.
///
/// The rows of the result are the orthonormal basis `H` (east), `M`
/// (north) and `A` (up): `H = E x A` normalized, `M = A x H`. Returns
/// `None` when the two vectors are too close to parallel for the cross
/// product to define a frame (free fall, or next to a magnetic pole).
pub fn reference_matrix(gravity: &[f32; 3], geomagnetic: &[f32; 3]) -> Option<[f32; 9]> {
    let [ax, ay, az] = *gravity;
    let [ex, ey, ez] = *geomagnetic;

    let mut hx = ey * az - ez * ay;
    let mut hy = ez * ax - ex * az;
    let mut hz = ex * ay - ey * ax;
    let norm_h = (hx * hx + hy * hy + hz * hz).sqrt();
    if norm_h < MIN_CROSS_NORM {
        return None;
    }
    let inv_h = 1.0 / norm_h;
    hx *= inv_h;
    hy *= inv_h;
    hz *= inv_h;

    let inv_a = 1.0 / (ax * ax + ay * ay + az * az).sqrt();
    let (ax, ay, az) = (ax * inv_a, ay * inv_a, az * inv_a);

    let mx = ay * hz - az * hy;
    let my = az * hx - ax * hz;
    let mz = ax * hy - ay * hx;

    Some([hx, hy, hz, mx, my, mz, ax, ay, az])
}

/// Extract `(azimuth, pitch, roll)` in radians from a rotation matrix.
pub fn orientation_angles(m: &[f32; 9]) -> [f32; 3] {
    [
        m[1].atan2(m[4]),
        (-m[7]).asin(),
        (-m[6]).atan2(m[8]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: [f32; 3] = [0.0, 0.0, 9.81];
    const MAG_FIELD: [f32; 3] = [0.0, 22.0, -40.0];

    fn engine_with_reference() -> OrientationEngine {
        let mut engine = OrientationEngine::new();
        engine.ingest_accelerometer(GRAVITY);
        engine.ingest_magnetic(MAG_FIELD);
        engine
    }

    #[test]
    fn test_gravity_filter_converges_to_constant_input() {
        let mut engine = OrientationEngine::new();
        let mut split = engine.ingest_accelerometer(GRAVITY);
        for _ in 0..100 {
            split = engine.ingest_accelerometer(GRAVITY);
        }
        assert!((split.gravity[2] - 9.81).abs() < 1e-3);
        assert!(split.linear[2].abs() < 1e-3);
        assert_eq!(split.raw, GRAVITY);
    }

    #[test]
    fn test_linear_acceleration_tracks_spikes() {
        let mut engine = OrientationEngine::new();
        for _ in 0..100 {
            engine.ingest_accelerometer(GRAVITY);
        }
        // A sudden burst shows up in the linear component, not in gravity.
        let split = engine.ingest_accelerometer([3.0, 0.0, 9.81]);
        assert!(split.linear[0] > 2.0);
        assert!(split.gravity[0] < 1.0);
    }

    #[test]
    fn test_no_orientation_before_reference() {
        let mut engine = OrientationEngine::new();
        assert!(engine.ingest_gyroscope(0, [0.5, 0.0, 0.0]).is_none());
        assert!(!engine.has_reference());
        // Accelerometer alone is not enough.
        engine.ingest_accelerometer(GRAVITY);
        assert!(engine.ingest_gyroscope(20, [0.5, 0.0, 0.0]).is_none());
        assert!(!engine.has_reference());
    }

    #[test]
    fn test_reference_acquired_then_first_sample_seeds() {
        let mut engine = engine_with_reference();
        // The call that acquires the reference only records the timestamp.
        assert!(engine.ingest_gyroscope(0, [0.0, 0.0, 0.0]).is_none());
        assert!(engine.has_reference());
        // The next one integrates and reports an orientation.
        assert!(engine.ingest_gyroscope(20, [0.0, 0.0, 0.0]).is_some());
    }

    #[test]
    fn test_zero_rotation_keeps_orientation_fixed() {
        let mut engine = engine_with_reference();
        engine.ingest_gyroscope(0, [0.0, 0.0, 0.0]);
        let first = engine.ingest_gyroscope(100, [0.0, 0.0, 0.0]).unwrap();
        let later = engine.ingest_gyroscope(5000, [0.0, 0.0, 0.0]).unwrap();
        for (a, b) in first.iter().zip(later.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_integration_accumulates_rotation() {
        let mut engine = engine_with_reference();
        engine.ingest_gyroscope(0, [0.0, 0.0, 0.0]);
        let start = engine.ingest_gyroscope(10, [0.0, 0.0, 0.0]).unwrap();
        // Rotate around the device Z axis at 1 rad/s for one second.
        let mut end = start;
        for i in 1..=100 {
            if let Some(o) = engine.ingest_gyroscope(10 + i * 10, [0.0, 0.0, 1.0]) {
                end = o;
            }
        }
        let turned = (end[0] - start[0]).abs();
        assert!(turned > 0.5, "azimuth moved only {turned} rad");
    }

    #[test]
    fn test_degenerate_reference_is_retried() {
        let mut engine = OrientationEngine::new();
        // Parallel vectors cannot define a frame.
        engine.ingest_accelerometer([0.0, 0.0, 9.81]);
        engine.ingest_magnetic([0.0, 0.0, 1.0]);
        assert!(engine.ingest_gyroscope(0, [0.1, 0.0, 0.0]).is_none());
        assert!(!engine.has_reference());
        // A usable magnetometer reading arrives later.
        engine.ingest_magnetic(MAG_FIELD);
        engine.ingest_gyroscope(20, [0.1, 0.0, 0.0]);
        assert!(engine.has_reference());
    }

    #[test]
    fn test_reference_matrix_is_orthonormal() {
        let m = reference_matrix(&GRAVITY, &MAG_FIELD).unwrap();
        for row in 0..3 {
            let norm: f32 = (0..3).map(|c| m[row * 3 + c] * m[row * 3 + c]).sum();
            assert!((norm - 1.0).abs() < 1e-4, "row {row} norm {norm}");
        }
        // Rows are mutually orthogonal.
        let dot01: f32 = (0..3).map(|c| m[c] * m[3 + c]).sum();
        let dot02: f32 = (0..3).map(|c| m[c] * m[6 + c]).sum();
        assert!(dot01.abs() < 1e-4);
        assert!(dot02.abs() < 1e-4);
    }

    #[test]
    fn test_reference_matrix_rejects_parallel_vectors() {
        assert!(reference_matrix(&[0.0, 0.0, 9.81], &[0.0, 0.0, 50.0]).is_none());
    }

    #[test]
    fn test_identity_quaternion_maps_to_identity_matrix() {
        let m = Quaternion::identity().to_rotation_matrix();
        assert_eq!(m, crate::math::mat3_identity());
    }

    #[test]
    fn test_axis_angle_quarter_turn() {
        let m = Quaternion::from_axis_angle([0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2)
            .to_rotation_matrix();
        // Rotating the X unit vector a quarter turn around Z yields Y.
        let x = [m[0], m[3], m[6]];
        assert!((x[0]).abs() < 1e-6);
        assert!((x[1] - 1.0).abs() < 1e-6);
        assert!((x[2]).abs() < 1e-6);
    }

    #[test]
    fn test_orientation_angles_of_identity() {
        let angles = orientation_angles(&crate::math::mat3_identity());
        assert_eq!(angles, [0.0, 0.0, 0.0]);
    }
}
