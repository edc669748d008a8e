//! The track aggregate: one recording session's worth of retained samples.
//!
//! A [`Track`] holds one ordered sequence per sensor channel plus the delta
//! thresholds it was recorded with, so a consumer can tell how aggressively
//! the stream was reduced. A [`TrackPart`] is a detached, numbered slice of
//! a track with the same shape, sized for progressive upload.
//!
//! Serialization of both types is the storage/upload contract; wire names
//! are fixed (`partNum`, `linearAcc`, `terminal`, ...).

use rand::Rng;
use serde::Serialize;

use crate::types::{
    DeviceInfo, LocationSample, RotationSample, SensorSample, TrackEvent,
};

/// Numeric configuration consumed at session start. All thresholds are
/// immutable for the lifetime of the session that copied them.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Retention threshold for the raw acceleration channel, m/s².
    pub acceleration_delta: f32,
    /// Retention threshold for the gyroscope-orientation channel, rad.
    pub gyroscope_delta: f32,
    /// Retention threshold for the gravity and linear-acceleration
    /// channels, m/s² (0.1 m/s² is roughly 0.01 rad of device tilt).
    pub gravity_delta: f32,
    /// Retention threshold for the compass channel, µT.
    pub compass_delta: f32,
    /// Retention threshold for the rotation-vector channel (quaternion
    /// component distance).
    pub rotation_delta: f32,
    /// Retention threshold for the altitude channel, meters.
    pub altitude_delta: f32,
    /// Retention threshold for the location channel, meters of ground
    /// distance.
    pub location_delta: f64,
    /// Ceiling on the time (ms) any channel may go without retaining a
    /// sample, shared by every channel.
    pub max_unsaved_period: i64,
    /// Number of unsent acceleration samples that should trigger an
    /// incremental part emission, and the window size for offline
    /// splitting.
    pub part_step: usize,
    /// Number of initial pressure readings averaged into the altitude
    /// baseline.
    pub altitude_baseline_count: u32,
    /// Acceleration samples after which the session should be stopped and
    /// restarted by the caller to bound memory and payload size.
    pub max_acceleration_samples: usize,
    /// Platform sampling-rate hint recorded into the track metadata;
    /// negative when unknown.
    pub sensor_data_rate: i32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            acceleration_delta: 0.1,
            gyroscope_delta: 0.1,
            gravity_delta: 0.1,
            compass_delta: 2.0,
            rotation_delta: 0.02,
            altitude_delta: 0.1,
            location_delta: 0.1,
            max_unsaved_period: 5000,
            part_step: 1000,
            altitude_baseline_count: 3,
            max_acceleration_samples: 40_000,
            sensor_data_rate: -1,
        }
    }
}

/// All retained data of one recording session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Random unique id shared by the track and every part cut from it.
    pub uuid: String,
    /// Session start, ms since the Unix epoch.
    pub start: i64,
    /// Session end, ms since the Unix epoch; 0 while recording.
    pub end: i64,
    /// Total number of parts the track was cut into; -1 until known.
    #[serde(rename = "partCount")]
    pub part_count: i32,
    /// Sampling-rate hint the session was recorded with; -1 when unknown.
    #[serde(rename = "sensorDataRate")]
    pub sensor_data_rate: i32,

    #[serde(rename = "accelerationDelta")]
    pub acceleration_delta: f32,
    #[serde(rename = "gyroscopeDelta")]
    pub gyroscope_delta: f32,
    #[serde(rename = "gravityDelta")]
    pub gravity_delta: f32,
    #[serde(rename = "compassDelta")]
    pub compass_delta: f32,
    #[serde(rename = "rotationDelta")]
    pub rotation_delta: f32,
    #[serde(rename = "altitudeDelta")]
    pub altitude_delta: f32,
    #[serde(rename = "locationDelta")]
    pub location_delta: f64,

    /// Raw acceleration, gravity included. The primary channel: part
    /// emission is triggered and windowed by this sequence.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub acceleration: Vec<SensorSample>,
    /// Acceleration with gravity removed.
    #[serde(rename = "linearAcc", skip_serializing_if = "Vec::is_empty")]
    pub linear_acc: Vec<SensorSample>,
    /// Gravity direction and magnitude.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gravity: Vec<SensorSample>,
    /// Geomagnetic field along the device axes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compass: Vec<SensorSample>,
    /// Gyroscope-integrated orientation angles.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gyroscope: Vec<SensorSample>,
    /// Rotation-vector samples.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rotation: Vec<RotationSample>,
    /// Pressure-derived altitude samples.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub altitude: Vec<SensorSample>,
    /// Location fixes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<LocationSample>,
    /// Flagged markers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<TrackEvent>,

    /// Recording device descriptor.
    pub terminal: DeviceInfo,
}

impl Track {
    /// Create an empty track for a new session, copying the thresholds out
    /// of the configuration.
    pub fn new(config: &TrackConfig, terminal: DeviceInfo) -> Self {
        Self {
            uuid: random_uuid(),
            start: 0,
            end: 0,
            part_count: -1,
            sensor_data_rate: config.sensor_data_rate,
            acceleration_delta: config.acceleration_delta,
            gyroscope_delta: config.gyroscope_delta,
            gravity_delta: config.gravity_delta,
            compass_delta: config.compass_delta,
            rotation_delta: config.rotation_delta,
            altitude_delta: config.altitude_delta,
            location_delta: config.location_delta,
            acceleration: Vec::new(),
            linear_acc: Vec::new(),
            gravity: Vec::new(),
            compass: Vec::new(),
            gyroscope: Vec::new(),
            rotation: Vec::new(),
            altitude: Vec::new(),
            location: Vec::new(),
            events: Vec::new(),
            terminal,
        }
    }

    /// A copy of the identity and threshold fields with empty channels,
    /// used as the base of every part cut from this track.
    pub fn header(&self) -> Track {
        Track {
            uuid: self.uuid.clone(),
            start: self.start,
            end: self.end,
            part_count: self.part_count,
            sensor_data_rate: self.sensor_data_rate,
            acceleration_delta: self.acceleration_delta,
            gyroscope_delta: self.gyroscope_delta,
            gravity_delta: self.gravity_delta,
            compass_delta: self.compass_delta,
            rotation_delta: self.rotation_delta,
            altitude_delta: self.altitude_delta,
            location_delta: self.location_delta,
            acceleration: Vec::new(),
            linear_acc: Vec::new(),
            gravity: Vec::new(),
            compass: Vec::new(),
            gyroscope: Vec::new(),
            rotation: Vec::new(),
            altitude: Vec::new(),
            location: Vec::new(),
            events: Vec::new(),
            terminal: self.terminal.clone(),
        }
    }
}

/// A numbered, time-bounded slice of a track.
///
/// Parts are detached snapshots: they share no state with the track they
/// were cut from. The channel fields and thresholds serialize at the top
/// level next to the part fields, so a part and a full track look alike on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPart {
    /// Zero-based serial number of this part within its track.
    #[serde(rename = "partNum")]
    pub part_num: i32,
    /// Earliest timestamp covered by this part, ms.
    #[serde(rename = "partStart")]
    pub part_start: i64,
    /// Latest timestamp covered by this part, ms.
    #[serde(rename = "partEnd")]
    pub part_end: i64,
    #[serde(flatten)]
    pub track: Track,
}

impl TrackPart {
    /// An empty part carrying the identity fields of `track`.
    pub fn from_track(track: &Track) -> Self {
        Self {
            part_num: 0,
            part_start: 0,
            part_end: 0,
            track: track.header(),
        }
    }
}

/// Random UUID-format identifier (version 4 layout).
fn random_uuid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    use std::fmt::Write;
    let mut out = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}
