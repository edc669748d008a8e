//! Core data types for the track recording pipeline.
//!
//! This module defines the sample types retained per channel and the device
//! descriptor attached to every track. All sample types are small copyable
//! structs; once constructed they are never mutated.
//!
//! The serde field names on these types are the transport contract: storage
//! and upload collaborators serialize the structures as-is, so the wire
//! names (`t`, `x`, `y`, `z`, `acc`, `deviceId`, ...) must stay stable.

use serde::{Serialize, Serializer};

/// Anything retained in a channel sequence carries a timestamp in
/// milliseconds since the Unix epoch.
pub trait Timestamped {
    fn timestamp(&self) -> i64;
}

/// Serialize an f32 rounded to four decimal places, keeping the wire
/// payload compact for high-volume channels.
pub(crate) fn round4<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f32((value * 10_000.0).round() / 10_000.0)
}

/// A single retained three-axis sensor reading.
///
/// The meaning of the components depends on the channel: acceleration,
/// linear acceleration and gravity store m/s² along the device axes, the
/// compass channel stores the magnetic field in µT, the gyroscope channel
/// stores orientation angles in radians, and the altitude channel stores
/// `(altitude - baseline, altitude, pressure)` as documented on the
/// recorder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSample {
    /// Timestamp in milliseconds since the Unix epoch.
    pub t: i64,
    #[serde(serialize_with = "round4")]
    pub x: f32,
    #[serde(serialize_with = "round4")]
    pub y: f32,
    #[serde(serialize_with = "round4")]
    pub z: f32,
}

impl SensorSample {
    pub fn new(t: i64, x: f32, y: f32, z: f32) -> Self {
        Self { t, x, y, z }
    }

    /// Build a sample from a three-component vector.
    pub fn from_vector(t: i64, v: [f32; 3]) -> Self {
        Self::new(t, v[0], v[1], v[2])
    }

    /// The three components as a vector, for distance checks.
    pub fn vector(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Timestamped for SensorSample {
    fn timestamp(&self) -> i64 {
        self.t
    }
}

/// A retained rotation-vector reading.
///
/// The components are the device rotation as a unit quaternion:
/// `x = qx*sin(θ/2)`, `y = qy*sin(θ/2)`, `z = qz*sin(θ/2)`, `cos = cos(θ/2)`,
/// plus the estimated heading accuracy in radians (-1 when unavailable).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RotationSample {
    pub t: i64,
    #[serde(serialize_with = "round4")]
    pub x: f32,
    #[serde(serialize_with = "round4")]
    pub y: f32,
    #[serde(serialize_with = "round4")]
    pub z: f32,
    #[serde(serialize_with = "round4")]
    pub cos: f32,
    #[serde(rename = "acc", serialize_with = "round4")]
    pub heading_accuracy: f32,
}

impl RotationSample {
    /// Build a sample from the five raw rotation-vector components.
    pub fn from_values(t: i64, v: [f32; 5]) -> Self {
        Self {
            t,
            x: v[0],
            y: v[1],
            z: v[2],
            cos: v[3],
            heading_accuracy: v[4],
        }
    }

    /// The quaternion vector part, used for the retention distance check.
    pub fn vector(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl Timestamped for RotationSample {
    fn timestamp(&self) -> i64 {
        self.t
    }
}

/// A raw location fix as delivered by the platform location service.
///
/// The fix is borrowed only for the duration of one ingestion call and is
/// never retained; the recorder keeps a [`LocationSample`] built from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters above the WGS-84 ellipsoid, when the provider
    /// reports one.
    pub altitude: Option<f64>,
    /// Ground speed in m/s, when the provider reports one.
    pub speed: Option<f64>,
}

/// A retained location reading.
///
/// Wire names follow the coordinate convention of the rest of the record:
/// `x` longitude, `y` latitude, `z` altitude, `s` speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocationSample {
    pub t: i64,
    #[serde(rename = "x")]
    pub longitude: f64,
    #[serde(rename = "y")]
    pub latitude: f64,
    #[serde(rename = "z")]
    pub altitude: f64,
    #[serde(rename = "s")]
    pub speed: f64,
}

impl LocationSample {
    /// Build a sample from a raw fix. Missing altitude or speed is stored
    /// as zero.
    pub fn from_fix(t: i64, fix: &LocationFix) -> Self {
        Self {
            t,
            longitude: fix.longitude,
            latitude: fix.latitude,
            altitude: fix.altitude.unwrap_or(0.0),
            speed: fix.speed.unwrap_or(0.0),
        }
    }
}

impl Timestamped for LocationSample {
    fn timestamp(&self) -> i64 {
        self.t
    }
}

/// Kind of a manually or automatically flagged track marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEventKind {
    Pit,
    Irregularity,
    Hill,
    StepUp,
    StepDown,
}

/// A flagged marker on the track timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackEvent {
    pub t: i64,
    #[serde(rename = "type")]
    pub kind: TrackEventKind,
}

impl TrackEvent {
    pub fn new(t: i64, kind: TrackEventKind) -> Self {
        Self { t, kind }
    }
}

impl Timestamped for TrackEvent {
    fn timestamp(&self) -> i64 {
        self.t
    }
}

/// Short description of the recording device, attached to every track and
/// part as the `terminal` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// OS release string.
    pub version: String,
    /// OS build identifier.
    pub build: String,
    /// Device model name.
    pub model: String,
    pub manufacturer: String,
    #[serde(rename = "deviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl DeviceInfo {
    pub fn new(version: &str, build: &str, model: &str, manufacturer: &str) -> Self {
        Self {
            version: version.to_string(),
            build: build.to_string(),
            model: model.to_string(),
            manufacturer: manufacturer.to_string(),
            device_id: None,
        }
    }

    pub fn with_device_id(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_sample_vector_round_trip() {
        let s = SensorSample::from_vector(10, [0.5, -1.5, 9.8]);
        assert_eq!(s.vector(), [0.5, -1.5, 9.8]);
        assert_eq!(s.timestamp(), 10);
    }

    #[test]
    fn test_wire_floats_rounded_to_four_decimals() {
        let s = SensorSample::new(1, 0.123456, 1.0, -2.000049);
        let json = serde_json::to_value(&s).unwrap();
        // f32 values widen to f64 in JSON, so compare with a tolerance.
        assert!((json["x"].as_f64().unwrap() - 0.1235).abs() < 1e-6);
        assert_eq!(json["y"], 1.0);
        assert_eq!(json["z"], -2.0);
    }

    #[test]
    fn test_rotation_sample_wire_names() {
        let r = RotationSample::from_values(5, [0.1, 0.2, 0.3, 0.9, -1.0]);
        let json = serde_json::to_value(&r).unwrap();
        assert!((json["cos"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(json["acc"], -1.0);
        assert!(json.get("heading_accuracy").is_none());
    }

    #[test]
    fn test_location_sample_from_partial_fix() {
        let fix = LocationFix {
            latitude: 50.45,
            longitude: 30.52,
            altitude: None,
            speed: Some(1.5),
        };
        let s = LocationSample::from_fix(100, &fix);
        assert_eq!(s.altitude, 0.0);
        assert_eq!(s.speed, 1.5);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["x"], 30.52);
        assert_eq!(json["y"], 50.45);
    }

    #[test]
    fn test_event_kind_wire_format() {
        let e = TrackEvent::new(7, TrackEventKind::StepUp);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "STEP_UP");
        assert_eq!(json["t"], 7);
    }

    #[test]
    fn test_device_info_omits_missing_id() {
        let d = DeviceInfo::new("14", "UQ1A", "Pixel 7", "Google");
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.get("deviceId").is_none());
        let json = serde_json::to_value(d.with_device_id("abc123")).unwrap();
        assert_eq!(json["deviceId"], "abc123");
    }
}
