use glam::{I64Vec3, Quat, Vec3};

use crate::config::TransformSyncConfig;
use crate::math::{delta_encode, quantize, rotation_changed};
use crate::net::{
    Channel, NetMessage, RotationData, TeleportMessage, TransformSnapshotDeltaMessage,
    TransformSnapshotMessage,
};
use crate::snapshot::Transform;

use super::{Outgoing, ReplicationMode, SyncFlags};

/// What the receiver currently holds, per family.
#[derive(Debug, Clone, Copy)]
struct Baseline {
    position: I64Vec3,
    rotation: Quat,
    scale: I64Vec3,
}

/// Server-side half of transform replication.
#[derive(Debug, Clone)]
pub struct TransformSender {
    config: TransformSyncConfig,
    entity_id: Option<u32>,
    ticks_until_send: u32,
    ticks_since_full: u32,
    force_full: bool,
    sent_unchanged: bool,
    baseline: Option<Baseline>,
}

impl TransformSender {
    pub fn new(config: TransformSyncConfig) -> Self {
        Self {
            config,
            entity_id: None,
            ticks_until_send: 0,
            ticks_since_full: 0,
            force_full: true,
            sent_unchanged: false,
            baseline: None,
        }
    }

    pub fn with_entity_id(mut self, entity_id: u32) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn config(&self) -> &TransformSyncConfig {
        &self.config
    }

    pub fn channel(&self) -> Channel {
        self.config.mode.channel()
    }

    /// The next send carries absolute values.
    pub fn force_full(&mut self) {
        self.force_full = true;
    }

    pub fn reset(&mut self) {
        self.ticks_until_send = 0;
        self.ticks_since_full = 0;
        self.force_full = true;
        self.sent_unchanged = false;
        self.baseline = None;
    }

    /// Call once per peer send interval.
    ///
    /// In full-only mode an idle entity still sends one unchanged snapshot
    /// after its last change, and `rebaseline_interval` counts entity ticks
    /// whether or not anything was sent, so a lost final update is repaired
    /// over the unreliable channel.
    pub fn tick(&mut self, transform: &Transform) -> Option<Outgoing> {
        if self.ticks_until_send > 0 {
            self.ticks_until_send -= 1;
            return None;
        }
        self.ticks_until_send = self.config.send_interval_multiplier.saturating_sub(1);

        let changed = self.changed(transform);
        let full = self.needs_full();
        if full {
            self.ticks_since_full = 0;
        } else {
            self.ticks_since_full = self.ticks_since_full.saturating_add(1);
        }

        let message = if full || !self.config.only_sync_on_change || !changed.is_empty() {
            self.sent_unchanged = changed.is_empty();
            match (full, self.config.mode) {
                (false, ReplicationMode::DeltaCompressed) => self.delta(transform, changed),
                _ => self.full(transform, changed, full),
            }
        } else if self.config.mode == ReplicationMode::FullOnly && !self.sent_unchanged {
            self.sent_unchanged = true;
            self.full(transform, self.config.sync, false)
        } else {
            return None;
        };

        Some(Outgoing {
            channel: self.channel(),
            message,
        })
    }

    /// Moves the entity without interpolation on the receiving side.
    pub fn teleport(
        &mut self,
        transform: &mut Transform,
        position: Vec3,
        rotation: Option<Quat>,
    ) -> Outgoing {
        transform.position = position;
        if let Some(rotation) = rotation {
            transform.rotation = rotation;
        }
        self.baseline = None;
        self.force_full = true;

        log::debug!("teleporting entity {:?} to {position}", self.entity_id);

        Outgoing {
            channel: Channel::Reliable,
            message: NetMessage::Teleport(TeleportMessage {
                entity_id: self.entity_id,
                position: position.to_array(),
                rotation: rotation.map(Quat::to_array),
            }),
        }
    }

    fn needs_full(&self) -> bool {
        self.force_full
            || self.baseline.is_none()
            || self
                .config
                .rebaseline_interval
                .is_some_and(|interval| self.ticks_since_full >= interval)
    }

    /// Synced families that moved past their thresholds since the last send.
    fn changed(&self, transform: &Transform) -> SyncFlags {
        let Some(baseline) = self.baseline else {
            return self.config.sync;
        };

        let mut changed = SyncFlags::empty();
        if quantize(transform.position, self.config.position_precision) != baseline.position {
            changed |= SyncFlags::POSITION;
        }
        if rotation_changed(
            baseline.rotation,
            transform.rotation,
            self.config.rotation_sensitivity,
        ) {
            changed |= SyncFlags::ROTATION;
        }
        if quantize(transform.scale, self.config.scale_precision) != baseline.scale {
            changed |= SyncFlags::SCALE;
        }
        changed & self.config.sync
    }

    /// Families that go into this message.
    fn included(&self, changed: SyncFlags, full: bool) -> SyncFlags {
        if full || !self.config.only_sync_on_change {
            self.config.sync
        } else {
            changed
        }
    }

    fn full(&mut self, transform: &Transform, changed: SyncFlags, full: bool) -> NetMessage {
        let included = self.included(changed, full);
        let mut baseline = self.baseline.unwrap_or(Baseline {
            position: quantize(transform.position, self.config.position_precision),
            rotation: transform.rotation,
            scale: quantize(transform.scale, self.config.scale_precision),
        });

        let mut message = TransformSnapshotMessage {
            entity_id: self.entity_id,
            position: None,
            rotation: None,
            scale: None,
        };
        if included.contains(SyncFlags::POSITION) {
            message.position = Some(transform.position.to_array());
            baseline.position = quantize(transform.position, self.config.position_precision);
        }
        if included.contains(SyncFlags::ROTATION) {
            message.rotation = Some(RotationData::encode(
                transform.rotation,
                self.config.compress_rotation,
            ));
            baseline.rotation = transform.rotation;
        }
        if included.contains(SyncFlags::SCALE) {
            message.scale = Some(transform.scale.to_array());
            baseline.scale = quantize(transform.scale, self.config.scale_precision);
        }

        self.baseline = Some(baseline);
        if full {
            self.force_full = false;
        }
        NetMessage::TransformSnapshot(message)
    }

    fn delta(&mut self, transform: &Transform, changed: SyncFlags) -> NetMessage {
        let included = self.included(changed, false);
        let Some(mut baseline) = self.baseline else {
            return self.full(transform, changed, true);
        };

        let mut message = TransformSnapshotDeltaMessage {
            entity_id: self.entity_id,
            delta_position: None,
            rotation: None,
            delta_scale: None,
        };
        if included.contains(SyncFlags::POSITION) {
            let current = quantize(transform.position, self.config.position_precision);
            message.delta_position = Some(delta_encode(current, baseline.position).to_array());
            baseline.position = current;
        }
        if included.contains(SyncFlags::ROTATION) {
            message.rotation = Some(RotationData::encode(
                transform.rotation,
                self.config.compress_rotation,
            ));
            baseline.rotation = transform.rotation;
        }
        if included.contains(SyncFlags::SCALE) {
            let current = quantize(transform.scale, self.config.scale_precision);
            message.delta_scale = Some(delta_encode(current, baseline.scale).to_array());
            baseline.scale = current;
        }

        self.baseline = Some(baseline);
        NetMessage::TransformSnapshotDelta(message)
    }
}
