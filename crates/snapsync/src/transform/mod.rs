//! Transform replication.
//!
//! The owner of an entity runs a [`TransformSender`], every observer runs a
//! [`TransformReceiver`]. Poses travel either as absolute values or as
//! quantized deltas against the last pose both sides agreed on.

mod receiver;
mod sender;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::net::{Channel, NetMessage};

pub use receiver::{SyncError, TransformReceiver, needs_correction, rewrite_history};
pub use sender::TransformSender;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SyncFlags: u8 {
        const POSITION = 1 << 0;
        const ROTATION = 1 << 1;
        const SCALE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMode {
    /// Absolute values every send, over the unreliable channel.
    FullOnly,
    /// Quantized deltas. Both sides step their baselines in lockstep, which
    /// only holds over reliable ordered delivery.
    #[default]
    DeltaCompressed,
}

impl ReplicationMode {
    pub fn channel(self) -> Channel {
        match self {
            Self::FullOnly => Channel::Unreliable,
            Self::DeltaCompressed => Channel::Reliable,
        }
    }
}

/// A message ready to hand to the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub channel: Channel,
    pub message: NetMessage,
}
