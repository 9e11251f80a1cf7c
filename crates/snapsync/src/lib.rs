pub mod config;
pub mod interpolation;
pub mod math;
pub mod net;
pub mod snapshot;
pub mod transform;

pub use config::{ConfigError, SnapshotSettings, TransformSyncConfig};
pub use interpolation::{CatchupParams, Interpolation, Sample, TimelineState};
pub use math::ExponentialMovingAverage;
pub use net::{
    Channel, Clock, ConnectionState, LinkConditions, ManualClock, MemoryTransport, NetMessage,
    PacketError, Peer, PeerError, ProtocolError, ReceiveTiming, Received, SystemClock, Transport,
    TransportError,
};
pub use snapshot::{
    Interpolate, Snapshot, SnapshotBuffer, TimeSnapshot, Transform, TransformSnapshot,
};
pub use transform::{
    Outgoing, ReplicationMode, SyncError, SyncFlags, TransformReceiver, TransformSender,
};
