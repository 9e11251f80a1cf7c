use serde::{Deserialize, Serialize};

use super::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSnapshot {
    pub remote_time: f64,
    pub local_time: f64,
}

impl TimeSnapshot {
    pub fn new(remote_time: f64, local_time: f64) -> Self {
        Self {
            remote_time,
            local_time,
        }
    }
}

impl Snapshot for TimeSnapshot {
    fn remote_time(&self) -> f64 {
        self.remote_time
    }

    fn local_time(&self) -> f64 {
        self.local_time
    }
}
