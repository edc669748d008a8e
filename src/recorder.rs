//! The recording session: ingestion, per-channel retention and part
//! emission behind one object.
//!
//! A [`TrackRecorder`] is created per session and shared with every sensor
//! callback. Each channel's `(samples, cursor)` pair sits behind its own
//! mutex, held for the duration of one append or one copy-and-advance, so
//! concurrent callbacks for different sensors never contend and a part
//! emission always advances a cursor to exactly the length it copied.
//! A session-level mutex serializes part emission and lifecycle changes
//! against each other. Lock order is session meta, then the fusion engine,
//! then channels in field order; every code path takes a subset in that
//! order.
//!
//! Stopping flips the session inactive and closes every channel under its
//! own lock, then hands the collected [`Track`] and its cursor set off as a
//! [`FinishedTrack`]. Ingestion that races with the stop is rejected as a
//! no-op; only part emission from an already-stopped session is reported as
//! an error, since that indicates a lifecycle bug in the caller.
//!
//! Expected timestamps are milliseconds since the Unix epoch, monotonic
//! within a session, as produced by re-anchoring sensor event time to the
//! wall clock at the first event.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::buffer::DeltaBuffer;
use crate::math;
use crate::orientation::{AccelSplit, OrientationEngine};
use crate::segmentation::{self, TrackCursor};
use crate::track::{Track, TrackConfig, TrackPart};
use crate::types::{
    DeviceInfo, LocationFix, LocationSample, RotationSample, SensorSample, TrackEvent,
    TrackEventKind,
};

/// Errors visible to the caller. Everything else in the pipeline degrades
/// silently by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackError {
    /// The session was already stopped and its data handed off. Seeing this
    /// means the caller's lifecycle ordering is wrong.
    #[error("track session already closed")]
    SessionClosed,
}

/// One channel's retained sequence plus its emission cursor.
#[derive(Debug)]
struct Channel<T> {
    samples: Vec<T>,
    cursor: usize,
    closed: bool,
}

impl<T: Clone> Channel<T> {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            cursor: 0,
            closed: false,
        }
    }

    fn unread(&self) -> usize {
        self.samples.len() - self.cursor
    }

    fn take_unread(&mut self) -> Vec<T> {
        segmentation::take_unread(&self.samples, &mut self.cursor)
    }
}

/// A high-rate channel fronted by a delta buffer.
#[derive(Debug)]
struct BufferedChannel {
    buffer: DeltaBuffer,
    channel: Channel<SensorSample>,
}

impl BufferedChannel {
    fn new(delta: f32, max_unsaved_period: i64) -> Self {
        Self {
            buffer: DeltaBuffer::new(delta, max_unsaved_period),
            channel: Channel::new(),
        }
    }

    /// Run one reading through the buffer and append whatever it releases.
    /// Returns the number of samples appended.
    fn ingest(&mut self, t: i64, values: [f32; 3]) -> usize {
        self.buffer.ingest(t, values);
        if !self.buffer.should_flush() {
            return 0;
        }
        let drained = self.buffer.drain();
        let appended = drained.len();
        self.channel.samples.extend(drained);
        appended
    }
}

/// Altitude channel with its one-time pressure baseline.
#[derive(Debug)]
struct AltitudeChannel {
    baseline_sum: f32,
    baseline_seen: u32,
    baseline: f32,
    channel: Channel<SensorSample>,
}

impl AltitudeChannel {
    fn new() -> Self {
        Self {
            baseline_sum: 0.0,
            baseline_seen: 0,
            baseline: 0.0,
            channel: Channel::new(),
        }
    }
}

/// Session metadata guarded by the lifecycle lock.
#[derive(Debug)]
struct Meta {
    header: Track,
    part_num: i32,
    stopped: bool,
}

/// A live recording session.
pub struct TrackRecorder {
    config: TrackConfig,
    /// Fast-path gate for ingestion; authoritative state is per channel.
    active: AtomicBool,
    /// Raw accelerometer readings seen, retained or not.
    raw_acceleration_count: AtomicU64,
    meta: Mutex<Meta>,
    engine: Mutex<OrientationEngine>,
    acceleration: Mutex<BufferedChannel>,
    linear_acc: Mutex<BufferedChannel>,
    gravity: Mutex<BufferedChannel>,
    compass: Mutex<Channel<SensorSample>>,
    gyroscope: Mutex<Channel<SensorSample>>,
    rotation: Mutex<Channel<RotationSample>>,
    altitude: Mutex<AltitudeChannel>,
    location: Mutex<Channel<LocationSample>>,
    events: Mutex<Channel<TrackEvent>>,
}

impl TrackRecorder {
    /// Open a new recording session. The track id is assigned here and the
    /// session clock starts immediately.
    pub fn start(config: TrackConfig, terminal: DeviceInfo) -> Self {
        let mut header = Track::new(&config, terminal);
        header.start = math::now_ms();
        debug!("track {} recording started", header.uuid);
        Self {
            active: AtomicBool::new(true),
            raw_acceleration_count: AtomicU64::new(0),
            meta: Mutex::new(Meta {
                header,
                part_num: 0,
                stopped: false,
            }),
            engine: Mutex::new(OrientationEngine::new()),
            acceleration: Mutex::new(BufferedChannel::new(
                config.acceleration_delta,
                config.max_unsaved_period,
            )),
            linear_acc: Mutex::new(BufferedChannel::new(
                config.acceleration_delta,
                config.max_unsaved_period,
            )),
            gravity: Mutex::new(BufferedChannel::new(
                config.gravity_delta,
                config.max_unsaved_period,
            )),
            compass: Mutex::new(Channel::new()),
            gyroscope: Mutex::new(Channel::new()),
            rotation: Mutex::new(Channel::new()),
            altitude: Mutex::new(AltitudeChannel::new()),
            location: Mutex::new(Channel::new()),
            events: Mutex::new(Channel::new()),
            config,
        }
    }

    /// Whether the session is still accepting samples.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Feed a raw accelerometer reading (m/s² along the device axes).
    ///
    /// The raw triple runs through the acceleration channel's retention
    /// buffer; the derived linear-acceleration and gravity triples are
    /// returned to the caller, which may route them into
    /// [`record_linear_acceleration`](Self::record_linear_acceleration) and
    /// [`record_gravity`](Self::record_gravity) on devices without
    /// dedicated virtual sensors. Returns `None` once the session stopped.
    pub fn record_accelerometer(&self, t: i64, raw: [f32; 3]) -> Option<AccelSplit> {
        if !self.is_active() {
            return None;
        }
        let split = self.engine.lock().unwrap().ingest_accelerometer(raw);
        let raw_seen = self.raw_acceleration_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.acceleration.lock().unwrap();
        if guard.channel.closed {
            return None;
        }
        let appended = guard.ingest(t, split.raw);
        if appended > 0 {
            let len = guard.channel.samples.len();
            if len % 10 == 0 {
                let ratio = 100 * len as u64 / raw_seen;
                debug!("recorded {len} acceleration points ({ratio}% of raw)");
            }
        }
        Some(split)
    }

    /// Feed a linear-acceleration reading (m/s², gravity removed).
    pub fn record_linear_acceleration(&self, t: i64, values: [f32; 3]) {
        if !self.is_active() {
            return;
        }
        let mut guard = self.linear_acc.lock().unwrap();
        if !guard.channel.closed {
            guard.ingest(t, values);
        }
    }

    /// Feed a gravity reading (m/s² along each device axis).
    pub fn record_gravity(&self, t: i64, values: [f32; 3]) {
        if !self.is_active() {
            return;
        }
        let mut guard = self.gravity.lock().unwrap();
        if !guard.channel.closed {
            guard.ingest(t, values);
        }
    }

    /// Feed a geomagnetic reading (µT along the device axes). The reading
    /// also feeds the orientation reference frame.
    pub fn record_magnetic(&self, t: i64, values: [f32; 3]) {
        if !self.is_active() {
            return;
        }
        self.engine.lock().unwrap().ingest_magnetic(values);
        let mut guard = self.compass.lock().unwrap();
        if guard.closed {
            return;
        }
        match guard.samples.last().copied() {
            None => {
                // TODO: the first compass sample is stamped with the wall
                // clock while later ones keep the event timestamp; switch to
                // the event timestamp once consumers accept the change.
                let sample = SensorSample::from_vector(math::now_ms(), values);
                guard.samples.push(sample);
            }
            Some(last) => {
                if math::distance3(&last.vector(), &values) > self.config.compass_delta as f64
                    || (t - last.t) > self.config.max_unsaved_period
                {
                    guard.samples.push(SensorSample::from_vector(t, values));
                }
            }
        }
    }

    /// Feed a gyroscope reading (rad/s around each device axis).
    ///
    /// The reading is integrated into an orientation sample; nothing is
    /// retained until the orientation reference frame exists, and samples
    /// with a non-finite component are dropped.
    pub fn record_gyroscope(&self, t: i64, angular_velocity: [f32; 3]) {
        if !self.is_active() {
            return;
        }
        let orientation = match self
            .engine
            .lock()
            .unwrap()
            .ingest_gyroscope(t, angular_velocity)
        {
            Some(orientation) => orientation,
            None => return,
        };
        if orientation.iter().any(|v| !v.is_finite()) {
            trace!("dropped non-finite orientation sample at {t}");
            return;
        }
        // Orientation arrives as (azimuth, pitch, roll); the stored axis
        // order is (pitch, roll, azimuth).
        // TODO: drop the axis remap together with the wall-clock stamp below
        // in the next wire-format revision; both predate the current
        // consumers.
        let stored = [orientation[1], orientation[2], orientation[0]];
        let mut guard = self.gyroscope.lock().unwrap();
        if guard.closed {
            return;
        }
        let append = match guard.samples.last() {
            None => true,
            Some(last) => {
                math::distance3(&last.vector(), &stored) > self.config.gyroscope_delta as f64
                    || (t - last.t) > self.config.max_unsaved_period
            }
        };
        if append {
            guard
                .samples
                .push(SensorSample::from_vector(math::now_ms(), stored));
        }
    }

    /// Feed a rotation-vector reading: the device rotation quaternion
    /// components `x*sin(θ/2), y*sin(θ/2), z*sin(θ/2), cos(θ/2)` plus the
    /// estimated heading accuracy in radians (-1 when unavailable).
    pub fn record_rotation_vector(&self, t: i64, values: [f32; 5]) {
        if !self.is_active() {
            return;
        }
        let mut guard = self.rotation.lock().unwrap();
        if guard.closed {
            return;
        }
        let append = match guard.samples.last() {
            None => true,
            Some(last) => {
                math::distance3(&last.vector(), &[values[0], values[1], values[2]])
                    > self.config.rotation_delta as f64
                    || (t - last.t) > self.config.max_unsaved_period
            }
        };
        if append {
            guard
                .samples
                .push(RotationSample::from_values(math::now_ms(), values));
        }
    }

    /// Feed a barometer reading (hPa).
    ///
    /// The first few readings are averaged into an altitude baseline and
    /// not retained; afterwards samples are stored as
    /// `(altitude - baseline, altitude, pressure)`.
    pub fn record_pressure(&self, t: i64, pressure_hpa: f32) {
        if !self.is_active() {
            return;
        }
        let altitude = math::altitude_from_pressure(pressure_hpa);
        let mut guard = self.altitude.lock().unwrap();
        if guard.channel.closed {
            return;
        }
        let baseline_count = self.config.altitude_baseline_count;
        if guard.baseline_seen < baseline_count {
            guard.baseline_sum += altitude;
            guard.baseline_seen += 1;
            if guard.baseline_seen >= baseline_count {
                guard.baseline = guard.baseline_sum / baseline_count as f32;
                debug!("altitude baseline locked at {:.1} m", guard.baseline);
            }
            return;
        }
        let relative = altitude - guard.baseline;
        let append = match guard.channel.samples.last() {
            None => true,
            Some(last) => {
                (last.x - relative).abs() > self.config.altitude_delta
                    || (t - last.t) > self.config.max_unsaved_period
            }
        };
        if append {
            guard
                .channel
                .samples
                .push(SensorSample::new(t, relative, altitude, pressure_hpa));
        }
    }

    /// Feed a location fix. The fix is read and released; only the derived
    /// [`LocationSample`] is retained.
    pub fn record_location(&self, t: i64, fix: &LocationFix) {
        if !self.is_active() {
            return;
        }
        let mut guard = self.location.lock().unwrap();
        if guard.closed {
            return;
        }
        let append = match guard.samples.last() {
            None => true,
            Some(last) => {
                let moved = math::earth_distance_m(
                    last.latitude,
                    last.longitude,
                    fix.latitude,
                    fix.longitude,
                );
                moved.abs() > self.config.location_delta
                    || (t - last.t) > self.config.max_unsaved_period
            }
        };
        if append {
            guard.samples.push(LocationSample::from_fix(t, fix));
        }
    }

    /// Record a flagged marker. Markers are kept unconditionally.
    pub fn record_event(&self, t: i64, kind: TrackEventKind) {
        if !self.is_active() {
            return;
        }
        let mut guard = self.events.lock().unwrap();
        if !guard.closed {
            guard.samples.push(TrackEvent::new(t, kind));
        }
    }

    /// Whether enough unsent acceleration samples have accumulated for the
    /// caller to request the next incremental part.
    pub fn part_due(&self) -> bool {
        self.is_active()
            && self.acceleration.lock().unwrap().channel.unread() >= self.config.part_step
    }

    /// Whether the session has grown past its configured sample cap and
    /// should be stopped (and, if desired, restarted) by the caller.
    pub fn capacity_reached(&self) -> bool {
        self.acceleration.lock().unwrap().channel.samples.len()
            > self.config.max_acceleration_samples
    }

    /// Cut the next incremental part from the unsent suffix of every
    /// channel.
    ///
    /// Returns `Ok(None)` when the acceleration channel has nothing unsent.
    /// Each channel is copied and its cursor advanced under that channel's
    /// lock, so a sample appended mid-emission lands in the next part
    /// rather than being skipped.
    pub fn next_part(&self) -> Result<Option<TrackPart>, TrackError> {
        let mut meta = self.meta.lock().unwrap();
        if meta.stopped {
            return Err(TrackError::SessionClosed);
        }
        let mut part = TrackPart::from_track(&meta.header);
        {
            let mut acceleration = self.acceleration.lock().unwrap();
            if acceleration.channel.unread() == 0 {
                return Ok(None);
            }
            part.track.acceleration = acceleration.channel.take_unread();
        }
        part.track.linear_acc = self.linear_acc.lock().unwrap().channel.take_unread();
        part.track.gravity = self.gravity.lock().unwrap().channel.take_unread();
        part.track.compass = self.compass.lock().unwrap().take_unread();
        part.track.gyroscope = self.gyroscope.lock().unwrap().take_unread();
        part.track.rotation = self.rotation.lock().unwrap().take_unread();
        part.track.altitude = self.altitude.lock().unwrap().channel.take_unread();
        part.track.location = self.location.lock().unwrap().take_unread();
        part.track.events = self.events.lock().unwrap().take_unread();
        part.part_num = meta.part_num;
        meta.part_num += 1;
        segmentation::set_part_bounds(&mut part);
        debug!(
            "emitting part {} of track {}: {} acceleration samples",
            part.part_num,
            part.track.uuid,
            part.track.acceleration.len()
        );
        Ok(Some(part))
    }

    /// End the session and hand off the finished track.
    ///
    /// Every channel is closed under its own lock, so ingestion racing with
    /// the stop is rejected instead of mutating a logically closed track.
    /// The track's `part_count` anticipates the closing part that
    /// [`FinishedTrack::final_part`] emits.
    pub fn stop(&self) -> Result<FinishedTrack, TrackError> {
        let mut meta = self.meta.lock().unwrap();
        if meta.stopped {
            warn!("stop on track {} which is already stopped", meta.header.uuid);
            return Err(TrackError::SessionClosed);
        }
        meta.stopped = true;
        self.active.store(false, Ordering::Release);

        let mut track = meta.header.clone();
        track.end = math::now_ms();
        track.part_count = meta.part_num + 1;
        let mut cursor = TrackCursor {
            part_num: meta.part_num,
            ..TrackCursor::default()
        };

        {
            let mut guard = self.acceleration.lock().unwrap();
            guard.channel.closed = true;
            track.acceleration = std::mem::take(&mut guard.channel.samples);
            cursor.acceleration = guard.channel.cursor;
        }
        {
            let mut guard = self.linear_acc.lock().unwrap();
            guard.channel.closed = true;
            track.linear_acc = std::mem::take(&mut guard.channel.samples);
            cursor.linear_acc = guard.channel.cursor;
        }
        {
            let mut guard = self.gravity.lock().unwrap();
            guard.channel.closed = true;
            track.gravity = std::mem::take(&mut guard.channel.samples);
            cursor.gravity = guard.channel.cursor;
        }
        {
            let mut guard = self.compass.lock().unwrap();
            guard.closed = true;
            track.compass = std::mem::take(&mut guard.samples);
            cursor.compass = guard.cursor;
        }
        {
            let mut guard = self.gyroscope.lock().unwrap();
            guard.closed = true;
            track.gyroscope = std::mem::take(&mut guard.samples);
            cursor.gyroscope = guard.cursor;
        }
        {
            let mut guard = self.rotation.lock().unwrap();
            guard.closed = true;
            track.rotation = std::mem::take(&mut guard.samples);
            cursor.rotation = guard.cursor;
        }
        {
            let mut guard = self.altitude.lock().unwrap();
            guard.channel.closed = true;
            track.altitude = std::mem::take(&mut guard.channel.samples);
            cursor.altitude = guard.channel.cursor;
        }
        {
            let mut guard = self.location.lock().unwrap();
            guard.closed = true;
            track.location = std::mem::take(&mut guard.samples);
            cursor.location = guard.cursor;
        }
        {
            let mut guard = self.events.lock().unwrap();
            guard.closed = true;
            track.events = std::mem::take(&mut guard.samples);
            cursor.events = guard.cursor;
        }

        debug!(
            "track {} stopped: {} acceleration points kept of {} raw",
            track.uuid,
            track.acceleration.len(),
            self.raw_acceleration_count.load(Ordering::Relaxed)
        );
        Ok(FinishedTrack { track, cursor })
    }
}

/// A finished, read-only track together with the emission cursor it ended
/// with, so transmission can resume where the live session left off.
#[derive(Debug)]
pub struct FinishedTrack {
    track: Track,
    cursor: TrackCursor,
}

impl FinishedTrack {
    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Next unsent part, continuing the live session's numbering, or `None`
    /// when the acceleration channel is exhausted.
    pub fn next_part(&mut self) -> Option<TrackPart> {
        segmentation::next_unsent_part(&self.track, &mut self.cursor)
    }

    /// The closing part: emitted unconditionally, with its `part_count` set
    /// so a receiver learns the true total even if earlier parts
    /// under-reported it.
    pub fn final_part(&mut self) -> TrackPart {
        segmentation::closing_part(&self.track, &mut self.cursor)
    }

    /// Re-cut the whole track into fixed windows of `chunk_size`
    /// acceleration samples, ignoring the incremental cursor.
    pub fn split_into_parts(&mut self, chunk_size: usize) -> Vec<TrackPart> {
        segmentation::split_into_parts(&mut self.track, chunk_size)
    }

    pub fn into_track(self) -> Track {
        self.track
    }
}
