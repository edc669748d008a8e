//! Sensor track recording core.
//!
//! This library turns raw motion and location events from a mobile device's
//! sensors into a compact, orientation-corrected trajectory record suitable
//! for storage and chunked network delivery.
//!
//! # Pipeline
//!
//! 1. **Orientation engine**: gyroscope rotation deltas are integrated on
//!    top of a reference frame derived once from gravity and the
//!    geomagnetic field; the same stage splits raw acceleration into
//!    gravity and linear acceleration with a complementary filter.
//! 2. **Retention**: every channel keeps a sample only when it differs
//!    enough from the last retained one, or when too much time passed
//!    without keeping anything. High-rate channels run through a two-slot
//!    delta buffer so the sample before a jump survives as well.
//! 3. **Segmentation**: the accumulated multi-channel record is sliced
//!    into ordered, resumable parts for progressive transmission, or
//!    re-cut offline into fixed-size chunks.
//!
//! Sensor acquisition, persistence and transport stay outside: the crate
//! consumes timestamped float vectors and hands back plain serializable
//! structures.
//!
//! # Example
//!
//! ```no_run
//! use sensortrack_core::{DeviceInfo, TrackConfig, TrackRecorder};
//!
//! let recorder = TrackRecorder::start(
//!     TrackConfig::default(),
//!     DeviceInfo::new("14", "UQ1A.240205", "Pixel 7", "Google"),
//! );
//! let split = recorder.record_accelerometer(1_700_000_000_000, [0.1, 0.2, 9.8]);
//! if let Some(split) = split {
//!     recorder.record_linear_acceleration(1_700_000_000_000, split.linear);
//!     recorder.record_gravity(1_700_000_000_000, split.gravity);
//! }
//! let mut finished = recorder.stop().unwrap();
//! let closing = finished.final_part();
//! assert_eq!(closing.track.part_count, 1);
//! ```

pub mod buffer;
pub mod math;
pub mod orientation;
pub mod recorder;
pub mod segmentation;
pub mod track;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use buffer::DeltaBuffer;
pub use orientation::{AccelSplit, OrientationEngine};
pub use recorder::{FinishedTrack, TrackError, TrackRecorder};
pub use segmentation::TrackCursor;
pub use track::{Track, TrackConfig, TrackPart};
pub use types::{
    DeviceInfo, LocationFix, LocationSample, RotationSample, SensorSample, TrackEvent,
    TrackEventKind,
};
