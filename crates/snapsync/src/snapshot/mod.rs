mod buffer;
mod time;
mod transform;

pub use buffer::SnapshotBuffer;
pub use time::TimeSnapshot;
pub use transform::{Transform, TransformSnapshot};

/// A timestamped sample that can be buffered and interpolated over.
pub trait Snapshot: Clone {
    /// Time the sender stamped on the sample. Buffers are ordered by this key.
    fn remote_time(&self) -> f64;

    /// Local time at which the sample was received.
    fn local_time(&self) -> f64;
}

pub trait Interpolate: Snapshot {
    fn interpolate(from: &Self, to: &Self, t: f64) -> Self;
}
