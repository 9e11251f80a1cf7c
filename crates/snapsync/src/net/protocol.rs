use glam::{Quat, Vec3};
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

use crate::math::{compress_rotation, decompress_rotation};

pub const MAX_PACKET_SIZE: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Reliable,
    Unreliable,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Reliable, Channel::Unreliable];
}

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum RotationData {
    Full([f32; 4]),
    Compressed(u32),
}

impl RotationData {
    pub fn encode(rotation: Quat, compress: bool) -> Self {
        if compress {
            Self::Compressed(compress_rotation(rotation))
        } else {
            Self::Full(rotation.to_array())
        }
    }

    pub fn decode(&self) -> Quat {
        match *self {
            Self::Full(components) => Quat::from_array(components).normalize(),
            Self::Compressed(packed) => decompress_rotation(packed),
        }
    }
}

/// Absolute pose. A `None` family is either not synced or unchanged.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TransformSnapshotMessage {
    pub entity_id: Option<u32>,
    pub position: Option<[f32; 3]>,
    pub rotation: Option<RotationData>,
    pub scale: Option<[f32; 3]>,
}

impl TransformSnapshotMessage {
    pub fn position(&self) -> Option<Vec3> {
        self.position.map(Vec3::from)
    }

    pub fn rotation(&self) -> Option<Quat> {
        self.rotation.as_ref().map(RotationData::decode)
    }

    pub fn scale(&self) -> Option<Vec3> {
        self.scale.map(Vec3::from)
    }
}

/// Quantized deltas against the previous baseline. Rotation is sent whole.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TransformSnapshotDeltaMessage {
    pub entity_id: Option<u32>,
    pub delta_position: Option<[i64; 3]>,
    pub rotation: Option<RotationData>,
    pub delta_scale: Option<[i64; 3]>,
}

impl TransformSnapshotDeltaMessage {
    pub fn is_empty(&self) -> bool {
        self.delta_position.is_none() && self.rotation.is_none() && self.delta_scale.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TeleportMessage {
    pub entity_id: Option<u32>,
    pub position: [f32; 3],
    pub rotation: Option<[f32; 4]>,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum NetMessage {
    /// Clock sample. The timestamp travels in the batch header.
    TimeSnapshot,
    TransformSnapshot(TransformSnapshotMessage),
    TransformSnapshotDelta(TransformSnapshotDeltaMessage),
    Teleport(TeleportMessage),
}

impl NetMessage {
    pub fn entity_id(&self) -> Option<u32> {
        match self {
            Self::TimeSnapshot => None,
            Self::TransformSnapshot(msg) => msg.entity_id,
            Self::TransformSnapshotDelta(msg) => msg.entity_id,
            Self::Teleport(msg) => msg.entity_id,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    /// Decodes a message from a slice at any offset.
    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}
