use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One-way link characteristics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub latency_ms: f64,
    /// Uniform jitter in `[-jitter_ms, +jitter_ms]` around the latency.
    pub jitter_ms: f64,
    pub loss_percent: f64,
}

impl LinkConditions {
    pub fn with_latency(latency_ms: f64) -> Self {
        Self {
            latency_ms,
            ..Default::default()
        }
    }

    /// Reliable ordered delivery keeps the latency but never drops or
    /// reorders.
    pub fn reliable(&self) -> Self {
        Self::with_latency(self.latency_ms)
    }

    pub fn is_lossy(&self) -> bool {
        self.loss_percent > 0.0
    }
}

#[derive(Debug)]
struct DelayedPacket<T> {
    release_time: f64,
    sequence: u64,
    payload: T,
}

impl<T> PartialEq for DelayedPacket<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for DelayedPacket<T> {}

impl<T> PartialOrd for DelayedPacket<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DelayedPacket<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_time
            .total_cmp(&self.release_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Delays, jitters and drops packets on one direction of one channel.
///
/// Time is whatever the caller passes in, so a run is fully reproducible for
/// a given seed.
#[derive(Debug)]
pub struct NetworkSimulator<T> {
    conditions: LinkConditions,
    ordered: bool,
    rng: StdRng,
    queue: BinaryHeap<DelayedPacket<T>>,
    next_sequence: u64,
    last_release: f64,
}

impl<T> NetworkSimulator<T> {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            ordered: false,
            rng: StdRng::seed_from_u64(seed),
            queue: BinaryHeap::new(),
            next_sequence: 0,
            last_release: f64::NEG_INFINITY,
        }
    }

    /// Never releases a packet before one enqueued earlier.
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn should_drop(&mut self) -> bool {
        if !self.conditions.is_lossy() {
            return false;
        }
        self.rng.random::<f64>() * 100.0 < self.conditions.loss_percent
    }

    /// One-way delay in seconds.
    pub fn delay(&mut self) -> f64 {
        let jitter = if self.conditions.jitter_ms > 0.0 {
            self.rng
                .random_range(-self.conditions.jitter_ms..=self.conditions.jitter_ms)
        } else {
            0.0
        };
        ((self.conditions.latency_ms + jitter) / 1000.0).max(0.0)
    }

    /// Queues `payload` for release. Returns false when it was dropped.
    pub fn enqueue(&mut self, payload: T, now: f64) -> bool {
        if self.should_drop() {
            return false;
        }

        let mut release_time = now + self.delay();
        if self.ordered {
            release_time = release_time.max(self.last_release);
        }
        self.last_release = self.last_release.max(release_time);

        self.queue.push(DelayedPacket {
            release_time,
            sequence: self.next_sequence,
            payload,
        });
        self.next_sequence += 1;
        true
    }

    /// Next packet whose release time has passed.
    pub fn pop_ready(&mut self, now: f64) -> Option<T> {
        if self.queue.peek()?.release_time > now {
            return None;
        }
        self.queue.pop().map(|delayed| delayed.payload)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
