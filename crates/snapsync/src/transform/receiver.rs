use glam::{I64Vec3, Quat, Vec3};

use crate::config::TransformSyncConfig;
use crate::interpolation::step_interpolation;
use crate::math::{delta_decode, dequantize, quantize};
use crate::net::{
    NetMessage, ReceiveTiming, TeleportMessage, TransformSnapshotDeltaMessage,
    TransformSnapshotMessage,
};
use crate::snapshot::{Interpolate, Snapshot, SnapshotBuffer, Transform, TransformSnapshot};

use super::SyncFlags;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SyncError {
    #[error("delta received before any full snapshot")]
    MissingBaseline,
}

/// True when a single stale snapshot is all that is left, meaning the
/// sender paused and has just started moving again.
pub fn needs_correction(
    buffer: &SnapshotBuffer<TransformSnapshot>,
    remote_timestamp: f64,
    buffer_time: f64,
    tolerance_multiplier: f64,
) -> bool {
    let threshold = buffer_time * tolerance_multiplier;
    buffer.len() == 1
        && buffer
            .first()
            .is_some_and(|s| remote_timestamp - s.remote_time >= threshold)
}

/// Replaces the buffer with the current pose one send interval before the
/// new snapshot, so interpolation starts from where the entity rests now
/// instead of from the old timestamp.
pub fn rewrite_history(
    buffer: &mut SnapshotBuffer<TransformSnapshot>,
    remote_timestamp: f64,
    local_time: f64,
    send_interval: f64,
    transform: &Transform,
) {
    buffer.clear();
    buffer.insert_if_not_exists(TransformSnapshot::from_transform(
        remote_timestamp - send_interval,
        local_time - send_interval,
        transform,
    ));
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    position: I64Vec3,
    scale: I64Vec3,
}

/// Client-side half of transform replication.
#[derive(Debug, Clone)]
pub struct TransformReceiver {
    config: TransformSyncConfig,
    send_interval: f64,
    buffer: SnapshotBuffer<TransformSnapshot>,
    baseline: Option<Baseline>,
    exhausted: bool,
}

impl TransformReceiver {
    /// `send_interval` is the sending peer's interval, before the entity's
    /// own multiplier.
    pub fn new(config: TransformSyncConfig, send_interval: f64) -> Self {
        Self {
            config,
            send_interval,
            buffer: SnapshotBuffer::new(),
            baseline: None,
            exhausted: false,
        }
    }

    /// Caps the number of buffered snapshots.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer = SnapshotBuffer::with_limit(limit);
        self
    }

    pub fn config(&self) -> &TransformSyncConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SnapshotBuffer<TransformSnapshot> {
        &self.buffer
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    fn entity_send_interval(&self) -> f64 {
        self.send_interval * self.config.send_interval_multiplier.max(1) as f64
    }

    /// Shift applied to remote timestamps of transform snapshots.
    pub fn timestamp_adjustment(&self) -> f64 {
        let multiplier = self.config.send_interval_multiplier.max(1) as f64;
        let adjustment = self.send_interval * (multiplier - 1.0);
        if self.config.timeline_offset {
            adjustment + self.entity_send_interval()
        } else {
            adjustment
        }
    }

    pub fn on_message(
        &mut self,
        message: &NetMessage,
        timing: ReceiveTiming,
        transform: &mut Transform,
    ) -> Result<(), SyncError> {
        match message {
            NetMessage::TransformSnapshot(msg) => {
                self.on_full(msg, timing, transform);
                Ok(())
            }
            NetMessage::TransformSnapshotDelta(msg) => self.on_delta(msg, timing, transform),
            NetMessage::Teleport(msg) => {
                self.on_teleport(msg, transform);
                Ok(())
            }
            NetMessage::TimeSnapshot => Ok(()),
        }
    }

    pub fn on_full(
        &mut self,
        msg: &TransformSnapshotMessage,
        timing: ReceiveTiming,
        transform: &Transform,
    ) {
        let position = msg.position();
        let rotation = msg.rotation();
        let scale = msg.scale();

        let mut baseline = self.baseline.unwrap_or(Baseline {
            position: quantize(transform.position, self.config.position_precision),
            scale: quantize(transform.scale, self.config.scale_precision),
        });
        if let Some(position) = position {
            baseline.position = quantize(position, self.config.position_precision);
        }
        if let Some(scale) = scale {
            baseline.scale = quantize(scale, self.config.scale_precision);
        }
        self.baseline = Some(baseline);

        self.add_snapshot(timing, position, rotation, scale, transform);
    }

    pub fn on_delta(
        &mut self,
        msg: &TransformSnapshotDeltaMessage,
        timing: ReceiveTiming,
        transform: &Transform,
    ) -> Result<(), SyncError> {
        let Some(mut baseline) = self.baseline else {
            return Err(SyncError::MissingBaseline);
        };

        if let Some(delta) = msg.delta_position {
            baseline.position = delta_decode(I64Vec3::from_array(delta), baseline.position);
        }
        if let Some(delta) = msg.delta_scale {
            baseline.scale = delta_decode(I64Vec3::from_array(delta), baseline.scale);
        }
        self.baseline = Some(baseline);

        let position = msg
            .delta_position
            .map(|_| dequantize(baseline.position, self.config.position_precision));
        let scale = msg
            .delta_scale
            .map(|_| dequantize(baseline.scale, self.config.scale_precision));
        let rotation = msg.rotation.as_ref().map(|r| r.decode());

        self.add_snapshot(timing, position, rotation, scale, transform);
        Ok(())
    }

    /// Buffers a pose. Families the message left out repeat the newest
    /// buffered snapshot, or the live transform when nothing is buffered.
    pub fn add_snapshot(
        &mut self,
        timing: ReceiveTiming,
        position: Option<Vec3>,
        rotation: Option<Quat>,
        scale: Option<Vec3>,
        transform: &Transform,
    ) {
        let remote_time = timing.remote_timestamp + self.timestamp_adjustment();
        let send_interval = self.entity_send_interval();
        let multiplier = self.config.send_interval_multiplier.max(1) as f64;

        if self.config.only_sync_on_change
            && needs_correction(
                &self.buffer,
                remote_time,
                timing.buffer_time * multiplier,
                self.config.only_sync_on_change_correction_multiplier,
            )
        {
            log::debug!("rewriting snapshot history after idle period");
            rewrite_history(
                &mut self.buffer,
                remote_time,
                timing.local_time,
                send_interval,
                transform,
            );
        }

        let fallback = self
            .buffer
            .latest()
            .map_or(*transform, TransformSnapshot::to_transform);

        let snapshot = TransformSnapshot::new(
            remote_time,
            timing.local_time,
            position.unwrap_or(fallback.position),
            rotation.unwrap_or(fallback.rotation),
            scale.unwrap_or(fallback.scale),
        );
        if !self.buffer.insert_if_not_exists(snapshot) {
            log::debug!(
                "dropped transform snapshot at {:.4}",
                snapshot.remote_time()
            );
        }
    }

    /// Samples the buffer at `timeline` and writes the result into
    /// `transform`. Returns false when nothing is buffered.
    pub fn update(&mut self, timeline: f64, transform: &mut Transform) -> bool {
        let Some(result) = step_interpolation(&mut self.buffer, timeline) else {
            return false;
        };

        if result.exhausted && !self.exhausted {
            log::debug!("transform buffer exhausted at {timeline:.4}, holding last pose");
        }
        self.exhausted = result.exhausted;

        let computed = TransformSnapshot::interpolate(&result.from, &result.to, result.t);
        self.apply(&computed, &result.to, transform);
        true
    }

    fn apply(
        &self,
        computed: &TransformSnapshot,
        end_goal: &TransformSnapshot,
        transform: &mut Transform,
    ) {
        let sync = self.config.sync;
        let interpolate = self.config.interpolate;
        let pick = |flag: SyncFlags| {
            if interpolate.contains(flag) {
                computed
            } else {
                end_goal
            }
        };

        if sync.contains(SyncFlags::POSITION) {
            transform.position = pick(SyncFlags::POSITION).position;
        }
        if sync.contains(SyncFlags::ROTATION) {
            transform.rotation = pick(SyncFlags::ROTATION).rotation;
        }
        if sync.contains(SyncFlags::SCALE) {
            transform.scale = pick(SyncFlags::SCALE).scale;
        }
    }

    /// Moves the entity immediately and forgets the buffered history.
    pub fn on_teleport(&mut self, msg: &TeleportMessage, transform: &mut Transform) {
        self.buffer.clear();
        self.baseline = None;
        self.exhausted = false;

        transform.position = Vec3::from(msg.position);
        if let Some(rotation) = msg.rotation {
            transform.rotation = Quat::from_array(rotation).normalize();
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.baseline = None;
        self.exhausted = false;
    }
}
