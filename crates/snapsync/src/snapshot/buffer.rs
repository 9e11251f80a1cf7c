use super::Snapshot;

/// Snapshots ordered by strictly increasing `remote_time`.
///
/// Inserting a snapshot whose key already exists is a no-op, so replayed or
/// retransmitted packets never grow the buffer. Old entries are only dropped
/// when the interpolator steps past them.
///
/// Backed by a sorted `Vec`: the slot is found by binary search, and an
/// out-of-order insert shifts the entries after it. Snapshots almost always
/// arrive at the tail and the buffer holds a handful of entries, so the
/// shift is cheap and sampling stays a linear scan over contiguous memory.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer<T> {
    snapshots: Vec<T>,
    limit: usize,
}

impl<T: Snapshot> Default for SnapshotBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Snapshot> SnapshotBuffer<T> {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Buffer that refuses inserts once `limit` entries are held.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Inserts `snapshot` at its sorted position. Returns false when the key
    /// already exists, the key is not finite, or the buffer is full.
    pub fn insert_if_not_exists(&mut self, snapshot: T) -> bool {
        let key = snapshot.remote_time();
        if !key.is_finite() {
            log::debug!("rejecting snapshot with non-finite remote time");
            return false;
        }

        if self.snapshots.len() >= self.limit {
            return false;
        }

        let index = self.snapshots.partition_point(|s| s.remote_time() < key);
        if self
            .snapshots
            .get(index)
            .is_some_and(|s| s.remote_time() == key)
        {
            return false;
        }

        self.snapshots.insert(index, snapshot);
        true
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.snapshots.get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.snapshots.first()
    }

    pub fn latest(&self) -> Option<&T> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.snapshots.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.snapshots.iter().map(Snapshot::remote_time)
    }

    /// Drops every entry before `index`.
    pub fn remove_before(&mut self, index: usize) {
        let index = index.min(self.snapshots.len());
        self.snapshots.drain(..index);
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::TimeSnapshot;

    fn is_strictly_sorted(buffer: &SnapshotBuffer<TimeSnapshot>) -> bool {
        let keys: Vec<f64> = buffer.keys().collect();
        keys.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let mut buffer = SnapshotBuffer::new();

        for time in [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.0] {
            assert!(buffer.insert_if_not_exists(TimeSnapshot::new(time, 0.0)));
        }

        assert_eq!(buffer.len(), 7);
        assert!(is_strictly_sorted(&buffer));
        assert_eq!(buffer.first().unwrap().remote_time, 1.0);
        assert_eq!(buffer.latest().unwrap().remote_time, 9.0);
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let mut buffer = SnapshotBuffer::new();

        assert!(buffer.insert_if_not_exists(TimeSnapshot::new(1.0, 0.1)));
        assert!(buffer.insert_if_not_exists(TimeSnapshot::new(2.0, 0.2)));
        assert!(!buffer.insert_if_not_exists(TimeSnapshot::new(1.0, 0.9)));
        assert!(!buffer.insert_if_not_exists(TimeSnapshot::new(2.0, 0.9)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.get(0).unwrap().local_time, 0.1);
        assert!(is_strictly_sorted(&buffer));
    }

    #[test]
    fn test_mixed_sequence_with_duplicates() {
        let mut buffer = SnapshotBuffer::new();
        let sequence = [5.0, 2.0, 5.0, 7.0, 2.0, 1.0, 7.0, 6.0, 3.0, 3.0];

        for time in sequence {
            let before = buffer.len();
            let inserted = buffer.insert_if_not_exists(TimeSnapshot::new(time, 0.0));
            if inserted {
                assert_eq!(buffer.len(), before + 1);
            } else {
                assert_eq!(buffer.len(), before);
            }
            assert!(is_strictly_sorted(&buffer));
        }

        assert_eq!(buffer.len(), 6);
    }

    #[test]
    fn test_limit_rejects_inserts() {
        let mut buffer = SnapshotBuffer::with_limit(2);

        assert!(buffer.insert_if_not_exists(TimeSnapshot::new(1.0, 0.0)));
        assert!(buffer.insert_if_not_exists(TimeSnapshot::new(2.0, 0.0)));
        assert!(!buffer.insert_if_not_exists(TimeSnapshot::new(3.0, 0.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_non_finite_keys_are_rejected() {
        let mut buffer = SnapshotBuffer::new();
        assert!(!buffer.insert_if_not_exists(TimeSnapshot::new(f64::NAN, 0.0)));
        assert!(!buffer.insert_if_not_exists(TimeSnapshot::new(f64::INFINITY, 0.0)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_remove_before_keeps_tail() {
        let mut buffer = SnapshotBuffer::new();
        for time in [1.0, 2.0, 3.0, 4.0] {
            buffer.insert_if_not_exists(TimeSnapshot::new(time, 0.0));
        }

        buffer.remove_before(2);
        assert_eq!(buffer.keys().collect::<Vec<_>>(), vec![3.0, 4.0]);

        buffer.remove_before(10);
        assert!(buffer.is_empty());
    }
}
