//! Two-slot retention buffer for high-rate channels.
//!
//! Raw accelerometer-class sensors deliver far more samples than are worth
//! keeping. The buffer tracks the last two ingested points and the last
//! point that was actually retained, and flushes only when the newest point
//! has moved more than a configured delta away from the last retained one,
//! or when too much time has passed without retaining anything.
//!
//! A flush hands out up to two points: the point immediately preceding a
//! large jump is retained together with the post-jump point, so the shape
//! of the transition survives the reduction.

use crate::math;
use crate::types::SensorSample;

/// One held data point and whether it has already been handed out.
#[derive(Debug, Clone, Copy)]
struct Slot {
    t: i64,
    values: [f32; 3],
    flushed: bool,
}

/// Delta/time retention buffer for one three-axis channel.
#[derive(Debug, Clone)]
pub struct DeltaBuffer {
    /// Minimum Euclidean distance from the last retained point for a new
    /// point to be worth keeping.
    delta: f32,
    /// Maximum time (ms) the channel may go without retaining a point.
    max_unsaved_period: i64,
    /// Previous-to-last ingested point.
    prev: Option<Slot>,
    /// Last ingested point.
    last: Option<Slot>,
    /// Value and time of the last point handed out by `drain`.
    last_flushed: Option<([f32; 3], i64)>,
}

impl DeltaBuffer {
    pub fn new(delta: f32, max_unsaved_period: i64) -> Self {
        Self {
            delta,
            max_unsaved_period,
            prev: None,
            last: None,
            last_flushed: None,
        }
    }

    /// Record a new point. The previous "last" point shifts into the
    /// "previous" slot, carrying its flushed flag with it.
    pub fn ingest(&mut self, t: i64, values: [f32; 3]) {
        self.prev = self.last;
        self.last = Some(Slot {
            t,
            values,
            flushed: false,
        });
    }

    /// Whether the current contents should be drained into the channel.
    ///
    /// True when the time since the last flush reaches the configured
    /// ceiling, when nothing was ever flushed and a point is waiting, or
    /// when the newest point is farther than `delta` from the last flushed
    /// value.
    pub fn should_flush(&self) -> bool {
        let last = match &self.last {
            Some(l) => l,
            None => return false,
        };
        match &self.last_flushed {
            Some((values, flushed_t)) => {
                (last.t - flushed_t) >= self.max_unsaved_period
                    || math::distance3(values, &last.values) > self.delta as f64
            }
            None => true,
        }
    }

    /// Hand out the unflushed points, oldest first, and mark them flushed.
    ///
    /// Returns zero, one or two samples. Draining again without an
    /// intervening `ingest` returns nothing. The last-flushed snapshot only
    /// advances when the newest point is part of the drain.
    pub fn drain(&mut self) -> Vec<SensorSample> {
        let mut out = Vec::with_capacity(2);
        if let Some(prev) = self.prev.as_mut() {
            if !prev.flushed {
                out.push(SensorSample::from_vector(prev.t, prev.values));
                prev.flushed = true;
            }
        }
        if let Some(last) = self.last.as_mut() {
            if !last.flushed {
                out.push(SensorSample::from_vector(last.t, last.values));
                last.flushed = true;
                self.last_flushed = Some((last.values, last.t));
            }
        }
        out
    }
}
