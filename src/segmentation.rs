//! Slicing a track into ordered, resumable parts.
//!
//! Two emission modes share the same bookkeeping:
//!
//! - **Incremental**: while a session runs (and once more when it closes),
//!   the unsent suffix of every channel is copied into the next numbered
//!   part and the per-channel cursor advances to the copied length. The
//!   live path lives on the recorder, which holds the channel locks; the
//!   functions here operate on a detached, finished track.
//! - **Offline**: a finished track is re-cut into fixed windows of the
//!   acceleration channel, with every other channel contributing its
//!   not-yet-consumed samples up to each window's end time. Concatenating
//!   the parts reproduces every channel exactly.

use log::debug;

use crate::math;
use crate::track::{Track, TrackPart};
use crate::types::Timestamped;

/// How far each channel of a track has already been emitted into parts,
/// plus the next part number. One cursor set exists per recording session
/// and dies with it.
#[derive(Debug, Clone, Default)]
pub struct TrackCursor {
    pub part_num: i32,
    pub acceleration: usize,
    pub linear_acc: usize,
    pub gravity: usize,
    pub compass: usize,
    pub gyroscope: usize,
    pub rotation: usize,
    pub altitude: usize,
    pub location: usize,
    pub events: usize,
}

/// Copy everything past `cursor` and advance it to the end.
pub(crate) fn take_unread<T: Clone>(data: &[T], cursor: &mut usize) -> Vec<T> {
    let start = (*cursor).min(data.len());
    *cursor = data.len();
    data[start..].to_vec()
}

/// Copy samples past `cursor` whose timestamp is at most `end_time`, or
/// everything remaining when `last` is set, advancing the cursor past the
/// copied range.
fn take_until<T: Timestamped + Clone>(
    data: &[T],
    cursor: &mut usize,
    end_time: i64,
    last: bool,
) -> Vec<T> {
    let start = (*cursor).min(data.len());
    let end = if last {
        data.len()
    } else {
        let mut end = start;
        while end < data.len() && data[end].timestamp() <= end_time {
            end += 1;
        }
        end
    };
    *cursor = end;
    data[start..end].to_vec()
}

fn earliest<T: Timestamped>(current: i64, data: &[T]) -> i64 {
    match data.first() {
        Some(first) => current.min(first.timestamp()),
        None => current,
    }
}

fn latest<T: Timestamped>(current: i64, data: &[T]) -> i64 {
    match data.last() {
        Some(last) => current.max(last.timestamp()),
        None => current,
    }
}

/// Set `part_start`/`part_end` to the min/max timestamp over every channel
/// in the part. An entirely empty part gets the current wall-clock time for
/// both bounds.
pub(crate) fn set_part_bounds(part: &mut TrackPart) {
    let t = &part.track;
    let mut start = i64::MAX;
    start = earliest(start, &t.acceleration);
    start = earliest(start, &t.linear_acc);
    start = earliest(start, &t.gravity);
    start = earliest(start, &t.compass);
    start = earliest(start, &t.gyroscope);
    start = earliest(start, &t.rotation);
    start = earliest(start, &t.altitude);
    start = earliest(start, &t.location);
    start = earliest(start, &t.events);
    if start == i64::MAX {
        start = math::now_ms();
    }
    let mut end = 0;
    end = latest(end, &t.acceleration);
    end = latest(end, &t.linear_acc);
    end = latest(end, &t.gravity);
    end = latest(end, &t.compass);
    end = latest(end, &t.gyroscope);
    end = latest(end, &t.rotation);
    end = latest(end, &t.altitude);
    end = latest(end, &t.location);
    end = latest(end, &t.events);
    if end == 0 {
        end = math::now_ms();
    }
    part.part_start = start;
    part.part_end = end;
}

/// Copy the unsent suffix of every channel into a part and advance the
/// cursor set. Shared by the detached entry points below; the caller has
/// already decided the part should exist.
fn copy_unread(track: &Track, cursor: &mut TrackCursor) -> TrackPart {
    let mut part = TrackPart::from_track(track);
    part.track.acceleration = take_unread(&track.acceleration, &mut cursor.acceleration);
    part.track.linear_acc = take_unread(&track.linear_acc, &mut cursor.linear_acc);
    part.track.gravity = take_unread(&track.gravity, &mut cursor.gravity);
    part.track.compass = take_unread(&track.compass, &mut cursor.compass);
    part.track.gyroscope = take_unread(&track.gyroscope, &mut cursor.gyroscope);
    part.track.rotation = take_unread(&track.rotation, &mut cursor.rotation);
    part.track.altitude = take_unread(&track.altitude, &mut cursor.altitude);
    part.track.location = take_unread(&track.location, &mut cursor.location);
    part.track.events = take_unread(&track.events, &mut cursor.events);
    part.part_num = cursor.part_num;
    cursor.part_num += 1;
    set_part_bounds(&mut part);
    part
}

/// Build the next part of a finished track, or `None` when the primary
/// (acceleration) channel has nothing unsent.
pub fn next_unsent_part(track: &Track, cursor: &mut TrackCursor) -> Option<TrackPart> {
    if cursor.acceleration >= track.acceleration.len() {
        return None;
    }
    Some(copy_unread(track, cursor))
}

/// Build the closing part of a finished track unconditionally, even when
/// every channel is exhausted. The part's `part_count` is set to
/// `part_num + 1` so a receiver learns the true total from the final part
/// alone.
pub fn closing_part(track: &Track, cursor: &mut TrackCursor) -> TrackPart {
    let mut part = copy_unread(track, cursor);
    part.track.part_count = part.part_num + 1;
    part
}

/// Re-cut a complete track into contiguous parts of `chunk_size`
/// acceleration samples each.
///
/// Window bounds come from the window's own first and last acceleration
/// timestamps; every other channel contributes its not-yet-consumed samples
/// with `t <= partEnd` (the final window takes all remainders, whatever
/// their timestamps). `part_count` is stamped on the source track and on
/// every produced part.
pub fn split_into_parts(track: &mut Track, chunk_size: usize) -> Vec<TrackPart> {
    if chunk_size == 0 {
        debug!("split_into_parts: chunk size 0, producing no parts");
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut cursor = TrackCursor::default();
    let total = track.acceleration.len();
    let mut i = 0;
    while i < total {
        let end = (i + chunk_size).min(total);
        let last = end == total;
        let mut part = TrackPart::from_track(track);
        part.part_num = parts.len() as i32;
        part.part_start = track.acceleration[i].t;
        part.part_end = track.acceleration[end - 1].t;
        part.track.acceleration = track.acceleration[i..end].to_vec();
        let end_time = part.part_end;
        part.track.linear_acc =
            take_until(&track.linear_acc, &mut cursor.linear_acc, end_time, last);
        part.track.gravity = take_until(&track.gravity, &mut cursor.gravity, end_time, last);
        part.track.compass = take_until(&track.compass, &mut cursor.compass, end_time, last);
        part.track.gyroscope =
            take_until(&track.gyroscope, &mut cursor.gyroscope, end_time, last);
        part.track.rotation = take_until(&track.rotation, &mut cursor.rotation, end_time, last);
        part.track.altitude = take_until(&track.altitude, &mut cursor.altitude, end_time, last);
        part.track.location = take_until(&track.location, &mut cursor.location, end_time, last);
        part.track.events = take_until(&track.events, &mut cursor.events, end_time, last);
        parts.push(part);
        i += chunk_size;
    }
    let count = parts.len() as i32;
    track.part_count = count;
    for part in &mut parts {
        part.track.part_count = count;
    }
    debug!(
        "split track {} into {} parts of <= {} acceleration samples",
        track.uuid, count, chunk_size
    );
    parts
}
