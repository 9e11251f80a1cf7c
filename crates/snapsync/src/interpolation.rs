//! Snapshot interpolation.
//!
//! The receiving side keeps a local timeline that trails the newest remote
//! snapshot by `buffer_time`. Every received [`TimeSnapshot`] feeds two moving
//! averages: the drift between the remote clock and the timeline, and the
//! interval between arrivals. Drift nudges the timescale up or down instead
//! of snapping the timeline; arrival jitter sizes the buffer.
//!
//! Every frame the timeline advances by `delta * timescale` and the buffer is
//! sampled for the pair of snapshots bracketing it. The timeline never runs
//! past the newest snapshot into extrapolation: the last pose is held.
//!
//! [`TimeSnapshot`]: crate::snapshot::TimeSnapshot

use crate::config::SnapshotSettings;
use crate::math::ExponentialMovingAverage;
use crate::snapshot::{Snapshot, SnapshotBuffer};

/// Timeline state owned by one side of one connection.
#[derive(Debug, Clone)]
pub struct TimelineState {
    pub timeline: f64,
    pub timescale: f64,
    pub drift_ema: ExponentialMovingAverage,
    pub delivery_time_ema: ExponentialMovingAverage,
}

impl TimelineState {
    pub fn new(drift_ema_window: f64, delivery_time_ema_window: f64) -> Self {
        Self {
            timeline: 0.0,
            timescale: 1.0,
            drift_ema: ExponentialMovingAverage::new(drift_ema_window),
            delivery_time_ema: ExponentialMovingAverage::new(delivery_time_ema_window),
        }
    }

    /// State for a peer receiving snapshots at `send_rate_hz`.
    pub fn from_settings(settings: &SnapshotSettings, send_rate_hz: u32) -> Self {
        Self::new(
            settings.drift_ema_window(send_rate_hz),
            settings.delivery_time_ema_window(send_rate_hz),
        )
    }

    pub fn reset(&mut self) {
        self.timeline = 0.0;
        self.timescale = 1.0;
        self.drift_ema.reset();
        self.delivery_time_ema.reset();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchupParams {
    pub send_interval: f64,
    pub buffer_time: f64,
    pub catchup_speed: f64,
    pub slowdown_speed: f64,
    /// In send intervals.
    pub catchup_negative_threshold: f64,
    /// In send intervals.
    pub catchup_positive_threshold: f64,
}

impl CatchupParams {
    pub fn new(settings: &SnapshotSettings, send_interval: f64, buffer_time: f64) -> Self {
        Self {
            send_interval,
            buffer_time,
            catchup_speed: settings.catchup_speed,
            slowdown_speed: settings.slowdown_speed,
            catchup_negative_threshold: settings.catchup_negative_threshold,
            catchup_positive_threshold: settings.catchup_positive_threshold,
        }
    }
}

/// Indices of the bracketing pair and the factor between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub from: usize,
    pub to: usize,
    pub t: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation<T> {
    pub from: T,
    pub to: T,
    pub t: f64,
    /// The timeline has run past every buffered snapshot, or fewer than two
    /// are buffered. `from` is held.
    pub exhausted: bool,
}

pub fn timescale(
    drift: f64,
    catchup_speed: f64,
    slowdown_speed: f64,
    absolute_negative_threshold: f64,
    absolute_positive_threshold: f64,
) -> f64 {
    if drift > absolute_positive_threshold {
        catchup_speed
    } else if drift < absolute_negative_threshold {
        slowdown_speed
    } else {
        1.0
    }
}

/// Buffer time multiplier recommended for the measured arrival jitter.
pub fn dynamic_adjustment(send_rate: f64, jitter_std_dev: f64, tolerance: f64) -> f64 {
    ((jitter_std_dev * send_rate).ceil() + tolerance).max(1.0)
}

/// Keeps the timeline within one buffer time of where it should trail the
/// newest remote time.
pub fn timeline_clamp(timeline: f64, buffer_time: f64, latest_remote_time: f64) -> f64 {
    let target = latest_remote_time - buffer_time;
    timeline.clamp(target - buffer_time, target + buffer_time)
}

pub fn insert_if_not_exists<T: Snapshot>(buffer: &mut SnapshotBuffer<T>, snapshot: T) -> bool {
    buffer.insert_if_not_exists(snapshot)
}

/// Inserts a clock-sync snapshot and adjusts the timeline.
///
/// Returns false when the snapshot was a duplicate (or the buffer is full);
/// nothing is adjusted in that case.
pub fn insert_and_adjust<T: Snapshot>(
    buffer: &mut SnapshotBuffer<T>,
    snapshot: T,
    state: &mut TimelineState,
    params: &CatchupParams,
) -> bool {
    if buffer.is_empty() {
        state.timeline = snapshot.remote_time() - params.buffer_time;
        state.timescale = 1.0;
    }

    if !buffer.insert_if_not_exists(snapshot) {
        return false;
    }

    let len = buffer.len();
    if len >= 2 {
        if let (Some(previous), Some(latest)) = (buffer.get(len - 2), buffer.get(len - 1)) {
            state
                .delivery_time_ema
                .add(latest.local_time() - previous.local_time());
        }
    }

    let Some(latest_remote_time) = buffer.latest().map(Snapshot::remote_time) else {
        return true;
    };

    state.timeline = timeline_clamp(state.timeline, params.buffer_time, latest_remote_time);

    let time_diff = latest_remote_time - state.timeline;
    state.drift_ema.add(time_diff);

    let drift = state.drift_ema.value() - params.buffer_time;
    let absolute_negative_threshold = params.send_interval * params.catchup_negative_threshold;
    let absolute_positive_threshold = params.send_interval * params.catchup_positive_threshold;

    let scale = timescale(
        drift,
        params.catchup_speed,
        params.slowdown_speed,
        absolute_negative_threshold,
        absolute_positive_threshold,
    );
    if scale != state.timescale {
        log::debug!(
            "timescale {:.3} -> {:.3} (drift {:.4}s)",
            state.timescale,
            scale,
            drift
        );
    }
    state.timescale = scale;

    true
}

#[inline]
pub fn step_time(delta: f64, timeline: &mut f64, timescale: f64) {
    *timeline += delta * timescale;
}

/// Finds the snapshots bracketing `timeline`.
///
/// Before the first snapshot this clamps to the first one, after the last
/// it holds the last one. Returns `None` for an empty buffer.
pub fn sample<T: Snapshot>(buffer: &SnapshotBuffer<T>, timeline: f64) -> Option<Sample> {
    if buffer.is_empty() {
        return None;
    }
    let len = buffer.len();

    // Index of the first snapshot strictly after the timeline.
    let upper = buffer
        .iter()
        .position(|s| s.remote_time() > timeline)
        .unwrap_or(len);

    if upper == 0 {
        return Some(Sample {
            from: 0,
            to: 0,
            t: 0.0,
        });
    }

    if upper == len {
        // Timeline sits exactly on, or past, the newest snapshot.
        let last = len - 1;
        return Some(Sample {
            from: last,
            to: last,
            t: 0.0,
        });
    }

    let from = upper - 1;
    let to = upper;
    let (Some(a), Some(b)) = (buffer.get(from), buffer.get(to)) else {
        return None;
    };
    let t = inverse_lerp(a.remote_time(), b.remote_time(), timeline);

    Some(Sample { from, to, t })
}

fn inverse_lerp(a: f64, b: f64, value: f64) -> f64 {
    if b == a {
        0.0
    } else {
        ((value - a) / (b - a)).clamp(0.0, 1.0)
    }
}

/// Samples the buffer at `timeline` and discards everything before the
/// bracketing pair.
pub fn step_interpolation<T: Snapshot>(
    buffer: &mut SnapshotBuffer<T>,
    timeline: f64,
) -> Option<Interpolation<T>> {
    let sample = sample(buffer, timeline)?;
    let from = buffer.get(sample.from)?.clone();
    let to = buffer.get(sample.to)?.clone();

    let exhausted =
        buffer.len() < 2 || (sample.from == sample.to && timeline > from.remote_time());

    buffer.remove_before(sample.from);

    Some(Interpolation {
        from,
        to,
        t: sample.t,
        exhausted,
    })
}

pub fn step<T: Snapshot>(
    buffer: &mut SnapshotBuffer<T>,
    delta: f64,
    timeline: &mut f64,
    timescale: f64,
) -> Option<Interpolation<T>> {
    step_time(delta, timeline, timescale);
    step_interpolation(buffer, *timeline)
}
