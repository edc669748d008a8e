//! Demo binary: records a short synthetic session and prints what a
//! transport collaborator would send.
//!
//! Run with `RUST_LOG=debug` to watch the retention and emission logging.

use anyhow::Result;
use log::info;

use sensortrack_core::math::now_ms;
use sensortrack_core::{DeviceInfo, LocationFix, TrackConfig, TrackEventKind, TrackRecorder};

fn main() -> Result<()> {
    env_logger::init();

    // A small part step so the ten-second demo emits a few parts.
    let config = TrackConfig {
        part_step: 20,
        ..TrackConfig::default()
    };
    let recorder = TrackRecorder::start(
        config,
        DeviceInfo::new("14", "UQ1A.240205", "Pixel 7", "Google"),
    );

    // Ten synthetic seconds at 50 Hz: a bumpy straight drive with a pothole
    // in the middle.
    let start = now_ms();
    for i in 0..500i64 {
        let t = start + i * 20;
        let bump = if i % 25 == 0 { 1.5 } else { 0.0 };
        let pothole = if (245..250).contains(&i) { -4.0 } else { 0.0 };
        if let Some(split) = recorder.record_accelerometer(t, [0.2 + bump, 0.0, 9.81 + pothole]) {
            recorder.record_linear_acceleration(t, split.linear);
            recorder.record_gravity(t, split.gravity);
        }
        recorder.record_magnetic(t, [12.0, 21.0, -43.0]);
        recorder.record_gyroscope(t, [0.0, 0.0, 0.05]);
        recorder.record_pressure(t, 1008.0 - i as f32 * 0.001);
        if i % 50 == 0 {
            recorder.record_location(
                t,
                &LocationFix {
                    latitude: 50.4501 + (i as f64) * 2e-6,
                    longitude: 30.5234,
                    altitude: Some(179.0),
                    speed: Some(8.3),
                },
            );
        }
        if i == 247 {
            recorder.record_event(t, TrackEventKind::Pit);
        }
        if recorder.part_due() {
            if let Some(part) = recorder.next_part()? {
                info!(
                    "would upload part {}: {} acceleration samples, {}..{}",
                    part.part_num,
                    part.track.acceleration.len(),
                    part.part_start,
                    part.part_end
                );
            }
        }
    }

    let mut finished = recorder.stop()?;
    let closing = finished.final_part();
    info!(
        "closing part {} of {} for track {}",
        closing.part_num,
        closing.track.part_count,
        closing.track.uuid
    );
    println!("{}", serde_json::to_string_pretty(&closing)?);

    let track = finished.track();
    println!(
        "track {}: {} acceleration, {} gravity, {} altitude, {} location samples, {} events",
        track.uuid,
        track.acceleration.len(),
        track.gravity.len(),
        track.altitude.len(),
        track.location.len(),
        track.events.len()
    );
    Ok(())
}
