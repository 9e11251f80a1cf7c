mod batch;
mod clock;
mod peer;
mod protocol;
mod simulator;
mod transport;

pub use batch::{BatchError, Batcher, LENGTH_PREFIX_SIZE, TIMESTAMP_SIZE, Unbatcher};
pub use clock::{Clock, IntervalTimer, ManualClock, SystemClock};
pub use peer::{ConnectionState, Peer, PeerError, ProtocolError, ReceiveTiming, Received};
pub use protocol::{
    Channel, MAX_PACKET_SIZE, NetMessage, PacketError, RotationData, TeleportMessage,
    TransformSnapshotDeltaMessage, TransformSnapshotMessage,
};
pub use simulator::{LinkConditions, NetworkSimulator};
pub use transport::{MemoryTransport, Transport, TransportError, TransportStats};
