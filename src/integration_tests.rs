//! End-to-end scenarios over the full recording pipeline.
//!
//! These tests drive a recorder the way the surrounding application would:
//! sensor callbacks arrive interleaved, parts are pulled while recording,
//! and the finished track is checked against the behavioral guarantees the
//! transport side relies on.

use crate::math;
use crate::recorder::{TrackError, TrackRecorder};
use crate::segmentation;
use crate::track::{Track, TrackConfig};
use crate::types::{DeviceInfo, LocationFix, SensorSample, Timestamped, TrackEventKind};

const BASE_T: i64 = 1_700_000_000_000;

fn device() -> DeviceInfo {
    DeviceInfo::new("14", "UQ1A.240205", "Pixel 7", "Google").with_device_id("it-device")
}

/// Record a short walk at 50 Hz: the acceleration signal holds a plateau
/// for 10 samples and then steps, so the stream has both redundant runs
/// (which must be reduced away) and jumps (which must be kept). Gyroscope,
/// magnetometer and a once-per-second location fix arrive alongside.
fn record_walk(recorder: &TrackRecorder, seconds: i64) {
    for i in 0..(seconds * 50) {
        let t = BASE_T + i * 20;
        let step = ((i / 10) % 5) as f32 * 0.3;
        let split = recorder.record_accelerometer(t, [step, 0.1, 9.8 + step]);
        if let Some(split) = split {
            recorder.record_linear_acceleration(t, split.linear);
            recorder.record_gravity(t, split.gravity);
        }
        recorder.record_magnetic(t, [10.0 + step * 4.0, 22.0, -40.0]);
        recorder.record_gyroscope(t, [0.0, 0.0, 0.3]);
        if i % 50 == 0 {
            let fix_num = (i / 50) as f64;
            recorder.record_location(
                t,
                &LocationFix {
                    latitude: 50.45 + fix_num * 1e-5,
                    longitude: 30.52,
                    altitude: Some(120.0),
                    speed: Some(1.4),
                },
            );
        }
    }
}

fn assert_non_decreasing<T: Timestamped>(label: &str, samples: &[T]) {
    for pair in samples.windows(2) {
        assert!(
            pair[1].timestamp() >= pair[0].timestamp(),
            "{label}: timestamps decreased"
        );
    }
}

/// Pairwise retention invariant of the channels that filter directly
/// against their last retained sample: consecutive points differ by more
/// than the delta or are separated by more than the shared time window.
///
/// Buffered channels are exempt by design (the point just before a jump is
/// retained even when it is close to its predecessor); their guarantees are
/// pinned down in the buffer's own tests.
fn assert_spacing(label: &str, samples: &[SensorSample], delta: f32, window: i64) {
    for pair in samples.windows(2) {
        let distance = math::distance3(&pair[0].vector(), &pair[1].vector());
        let gap = pair[1].t - pair[0].t;
        assert!(
            distance > delta as f64 || gap > window,
            "{label}: redundant consecutive samples (distance {distance}, gap {gap})"
        );
    }
}

#[test]
fn test_full_session_ordering_and_reduction() {
    let config = TrackConfig::default();
    let recorder = TrackRecorder::start(config.clone(), device());
    record_walk(&recorder, 4);
    recorder.record_event(BASE_T + 1500, TrackEventKind::Irregularity);
    let track = recorder.stop().unwrap().into_track();

    assert!(!track.acceleration.is_empty());
    assert!(!track.location.is_empty());
    assert!(!track.compass.is_empty());
    assert_non_decreasing("acceleration", &track.acceleration);
    assert_non_decreasing("linearAcc", &track.linear_acc);
    assert_non_decreasing("gravity", &track.gravity);
    assert_non_decreasing("location", &track.location);
    assert_non_decreasing("events", &track.events);

    assert_spacing(
        "compass",
        &track.compass,
        track.compass_delta,
        config.max_unsaved_period,
    );
    assert_spacing(
        "gyroscope",
        &track.gyroscope,
        track.gyroscope_delta,
        config.max_unsaved_period,
    );

    // 200 raw accelerometer samples arrived; the plateaus must be gone.
    assert!(track.acceleration.len() < 60, "kept {}", track.acceleration.len());
    assert!(track.acceleration.len() >= 20);
}

#[test]
fn test_incremental_parts_then_closing_part() {
    let config = TrackConfig {
        part_step: 5,
        ..TrackConfig::default()
    };
    let recorder = TrackRecorder::start(config, device());
    record_walk(&recorder, 2);

    let mut live_parts = Vec::new();
    while recorder.part_due() {
        match recorder.next_part().unwrap() {
            Some(part) => live_parts.push(part),
            None => break,
        }
    }
    assert!(!live_parts.is_empty());
    // Cursor exhaustion: a second pull with no new data yields nothing.
    assert!(recorder.next_part().unwrap().is_none());

    let mut finished = recorder.stop().unwrap();
    let closing = finished.final_part();
    assert_eq!(closing.part_num, live_parts.len() as i32);
    assert_eq!(closing.track.part_count, live_parts.len() as i32 + 1);
    assert_eq!(finished.track().part_count, live_parts.len() as i32 + 1);

    // Part numbers are sequential from zero.
    for (i, part) in live_parts.iter().enumerate() {
        assert_eq!(part.part_num, i as i32);
        assert_eq!(part.track.uuid, finished.track().uuid);
    }

    // Stopped means stopped.
    assert_eq!(recorder.next_part(), Err(TrackError::SessionClosed));
}

#[test]
fn test_live_parts_concatenate_to_track() {
    let recorder = TrackRecorder::start(TrackConfig::default(), device());
    record_walk(&recorder, 3);
    let mut parts = Vec::new();
    while let Some(part) = recorder.next_part().unwrap() {
        parts.push(part);
        if parts.len() > 100 {
            break;
        }
    }
    let mut finished = recorder.stop().unwrap();
    parts.push(finished.final_part());

    let mut acceleration = Vec::new();
    let mut gravity = Vec::new();
    let mut location = Vec::new();
    for part in &parts {
        acceleration.extend(part.track.acceleration.iter().copied());
        gravity.extend(part.track.gravity.iter().copied());
        location.extend(part.track.location.iter().copied());
    }
    let track = finished.track();
    assert_eq!(acceleration, track.acceleration);
    assert_eq!(gravity, track.gravity);
    assert_eq!(location, track.location);
}

#[test]
fn test_offline_split_covers_every_channel() {
    let recorder = TrackRecorder::start(TrackConfig::default(), device());
    record_walk(&recorder, 3);
    recorder.record_event(BASE_T + 900, TrackEventKind::Pit);
    recorder.record_event(BASE_T + 2100, TrackEventKind::StepDown);
    let mut track = recorder.stop().unwrap().into_track();
    let original = track.clone();

    let parts = segmentation::split_into_parts(&mut track, 4);
    assert!(parts.len() > 1);
    let count = parts.len() as i32;
    assert_eq!(track.part_count, count);
    assert!(parts.iter().all(|p| p.track.part_count == count));

    let mut acceleration = Vec::new();
    let mut linear = Vec::new();
    let mut compass = Vec::new();
    let mut gyroscope = Vec::new();
    let mut events = Vec::new();
    let mut location = Vec::new();
    for part in &parts {
        assert!(part.track.acceleration.len() <= 4);
        acceleration.extend(part.track.acceleration.iter().copied());
        linear.extend(part.track.linear_acc.iter().copied());
        compass.extend(part.track.compass.iter().copied());
        gyroscope.extend(part.track.gyroscope.iter().copied());
        events.extend(part.track.events.iter().copied());
        location.extend(part.track.location.iter().copied());
    }
    assert_eq!(acceleration, original.acceleration);
    assert_eq!(linear, original.linear_acc);
    assert_eq!(compass, original.compass);
    assert_eq!(gyroscope, original.gyroscope);
    assert_eq!(events, original.events);
    assert_eq!(location, original.location);
}

#[test]
fn test_part_bounds_are_ordered_and_plausible() {
    let recorder = TrackRecorder::start(TrackConfig::default(), device());
    record_walk(&recorder, 2);
    let part = recorder.next_part().unwrap().unwrap();
    assert!(part.part_start <= part.part_end);
    assert!(part.part_start >= BASE_T);
    let _ = recorder.stop().unwrap();
}

#[test]
fn test_wire_contract_field_names() {
    let recorder = TrackRecorder::start(TrackConfig::default(), device());
    record_walk(&recorder, 1);
    let mut finished = recorder.stop().unwrap();
    let closing = finished.final_part();
    let json = serde_json::to_value(&closing).unwrap();

    for key in [
        "uuid",
        "start",
        "end",
        "partNum",
        "partStart",
        "partEnd",
        "partCount",
        "sensorDataRate",
        "accelerationDelta",
        "gyroscopeDelta",
        "compassDelta",
        "rotationDelta",
        "gravityDelta",
        "altitudeDelta",
        "locationDelta",
        "terminal",
    ] {
        assert!(json.get(key).is_some(), "missing wire field {key}");
    }
    assert_eq!(json["terminal"]["deviceId"], "it-device");
    // Channels with data use the wire names; empty ones are omitted.
    assert!(json.get("acceleration").is_some());
    assert!(json.get("altitude").is_none());

    let track_json = serde_json::to_value(finished.track()).unwrap();
    assert!(track_json.get("linearAcc").is_some());
    assert!(track_json.get("partNum").is_none());
}

#[test]
fn test_empty_session_still_closes_cleanly() {
    let recorder = TrackRecorder::start(TrackConfig::default(), device());
    assert!(recorder.next_part().unwrap().is_none());
    let mut finished = recorder.stop().unwrap();
    let closing = finished.final_part();
    assert_eq!(closing.part_num, 0);
    assert_eq!(closing.track.part_count, 1);
    assert!(closing.track.acceleration.is_empty());
    // Wall-clock fallback bounds are still ordered.
    assert!(closing.part_start <= closing.part_end);
}

/// The offline splitter must honor its window arithmetic for a track
/// assembled by hand, independent of the recorder.
#[test]
fn test_split_of_handmade_track_matches_scenario() {
    let mut track = Track::new(&TrackConfig::default(), device());
    for i in 0..5 {
        track
            .acceleration
            .push(SensorSample::new(BASE_T + i * 10, i as f32, 0.0, 9.8));
    }
    let parts = segmentation::split_into_parts(&mut track, 2);
    let sizes: Vec<usize> = parts.iter().map(|p| p.track.acceleration.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(parts.iter().all(|p| p.track.part_count == 3));
}
