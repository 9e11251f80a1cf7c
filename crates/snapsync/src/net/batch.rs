//! Timestamped message batches.
//!
//! Layout: `[timestamp: f64 LE][len: u32 LE][message]...`. The timestamp is
//! the sender's local time when the batch was opened; receivers use it as
//! the remote time of every message inside.

use std::collections::VecDeque;

pub const TIMESTAMP_SIZE: usize = 8;
pub const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BatchError {
    #[error("batch of {0} bytes is too short for a timestamp")]
    MissingTimestamp(usize),
    #[error("batch timestamp is not finite")]
    InvalidTimestamp,
    #[error("truncated batch: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Collects outgoing messages for one channel into packets no larger than
/// `threshold`. A single message larger than the threshold gets a batch of
/// its own.
#[derive(Debug)]
pub struct Batcher {
    threshold: usize,
    batch: Vec<u8>,
    full_batches: VecDeque<Vec<u8>>,
}

impl Batcher {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            batch: Vec::new(),
            full_batches: VecDeque::new(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    pub fn add_message(&mut self, message: &[u8], timestamp: f64) {
        let needed = LENGTH_PREFIX_SIZE + message.len();
        if !self.batch.is_empty() && self.batch.len() + needed > self.threshold {
            self.full_batches.push_back(std::mem::take(&mut self.batch));
        }

        if self.batch.is_empty() {
            self.batch.extend_from_slice(&timestamp.to_le_bytes());
        }
        self.batch
            .extend_from_slice(&(message.len() as u32).to_le_bytes());
        self.batch.extend_from_slice(message);
    }

    /// Next batch to transmit: full batches first, then the open one.
    pub fn take_batch(&mut self) -> Option<Vec<u8>> {
        if let Some(batch) = self.full_batches.pop_front() {
            return Some(batch);
        }
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.batch.is_empty() || !self.full_batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.batch.clear();
        self.full_batches.clear();
    }
}

/// Reads messages back out of a received batch.
#[derive(Debug)]
pub struct Unbatcher<'a> {
    data: &'a [u8],
    offset: usize,
    remote_timestamp: f64,
}

impl<'a> Unbatcher<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, BatchError> {
        let Some(header) = data.get(..TIMESTAMP_SIZE) else {
            return Err(BatchError::MissingTimestamp(data.len()));
        };

        let mut bytes = [0u8; TIMESTAMP_SIZE];
        bytes.copy_from_slice(header);
        let remote_timestamp = f64::from_le_bytes(bytes);
        if !remote_timestamp.is_finite() {
            return Err(BatchError::InvalidTimestamp);
        }

        Ok(Self {
            data,
            offset: TIMESTAMP_SIZE,
            remote_timestamp,
        })
    }

    pub fn remote_timestamp(&self) -> f64 {
        self.remote_timestamp
    }

    fn read(&mut self, len: usize) -> Result<&'a [u8], BatchError> {
        let data: &'a [u8] = self.data;
        let end = self.offset.checked_add(len);
        match end.and_then(|end| data.get(self.offset..end)) {
            Some(bytes) => {
                self.offset += len;
                Ok(bytes)
            }
            None => Err(BatchError::Truncated {
                offset: self.offset,
                needed: len,
                available: data.len().saturating_sub(self.offset),
            }),
        }
    }
}

impl<'a> Iterator for Unbatcher<'a> {
    type Item = Result<&'a [u8], BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let result = self.read(LENGTH_PREFIX_SIZE).and_then(|prefix| {
            let mut bytes = [0u8; LENGTH_PREFIX_SIZE];
            bytes.copy_from_slice(prefix);
            self.read(u32::from_le_bytes(bytes) as usize)
        });

        if result.is_err() {
            // Stop after the first error, the rest of the batch is unusable.
            self.offset = self.data.len();
        }
        Some(result)
    }
}
