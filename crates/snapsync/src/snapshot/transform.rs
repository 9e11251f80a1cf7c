use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{Interpolate, Snapshot};

/// Live pose of a replicated entity, owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSnapshot {
    pub remote_time: f64,
    pub local_time: f64,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl TransformSnapshot {
    pub fn new(
        remote_time: f64,
        local_time: f64,
        position: Vec3,
        rotation: Quat,
        scale: Vec3,
    ) -> Self {
        Self {
            remote_time,
            local_time,
            position,
            rotation,
            scale,
        }
    }

    pub fn from_transform(remote_time: f64, local_time: f64, transform: &Transform) -> Self {
        Self::new(
            remote_time,
            local_time,
            transform.position,
            transform.rotation,
            transform.scale,
        )
    }

    pub fn to_transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

impl Snapshot for TransformSnapshot {
    fn remote_time(&self) -> f64 {
        self.remote_time
    }

    fn local_time(&self) -> f64 {
        self.local_time
    }
}

impl Interpolate for TransformSnapshot {
    fn interpolate(from: &Self, to: &Self, t: f64) -> Self {
        let s = t as f32;

        // Take the shortest arc.
        let to_rotation = if from.rotation.dot(to.rotation) < 0.0 {
            -to.rotation
        } else {
            to.rotation
        };

        Self {
            remote_time: from.remote_time + (to.remote_time - from.remote_time) * t,
            local_time: from.local_time + (to.local_time - from.local_time) * t,
            position: from.position.lerp(to.position, s),
            rotation: from.rotation.slerp(to_rotation, s),
            scale: from.scale.lerp(to.scale, s),
        }
    }
}
