use serde::{Deserialize, Serialize};

use crate::math::MIN_PRECISION;
use crate::transform::{ReplicationMode, SyncFlags};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {requirement}, got {value}")]
    OutOfRange {
        field: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

fn check(
    ok: bool,
    field: &'static str,
    requirement: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            requirement,
            value,
        })
    }
}

/// Timeline and buffering settings shared by every peer of a session.
///
/// Thresholds are expressed in send intervals, windows in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub server_send_rate_hz: u32,
    pub client_send_rate_hz: u32,
    pub buffer_time_multiplier: f64,
    pub buffer_limit: usize,
    pub dynamic_adjustment: bool,
    pub dynamic_adjustment_tolerance: f64,
    pub drift_ema_window_secs: f64,
    pub delivery_time_ema_window_secs: f64,
    pub catchup_speed: f64,
    pub slowdown_speed: f64,
    pub catchup_negative_threshold: f64,
    pub catchup_positive_threshold: f64,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            server_send_rate_hz: 30,
            client_send_rate_hz: 30,
            buffer_time_multiplier: 2.0,
            buffer_limit: 32,
            dynamic_adjustment: true,
            dynamic_adjustment_tolerance: 1.0,
            drift_ema_window_secs: 1.0,
            delivery_time_ema_window_secs: 2.0,
            catchup_speed: 1.02,
            slowdown_speed: 0.96,
            catchup_negative_threshold: -1.0,
            catchup_positive_threshold: 1.0,
        }
    }
}

impl SnapshotSettings {
    pub fn server_send_interval(&self) -> f64 {
        1.0 / self.server_send_rate_hz.max(1) as f64
    }

    pub fn client_send_interval(&self) -> f64 {
        1.0 / self.client_send_rate_hz.max(1) as f64
    }

    /// Drift EMA window in samples for a peer receiving at `send_rate_hz`.
    pub fn drift_ema_window(&self, send_rate_hz: u32) -> f64 {
        send_rate_hz as f64 * self.drift_ema_window_secs
    }

    pub fn delivery_time_ema_window(&self, send_rate_hz: u32) -> f64 {
        send_rate_hz as f64 * self.delivery_time_ema_window_secs
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.server_send_rate_hz > 0,
            "server_send_rate_hz",
            "positive",
            self.server_send_rate_hz as f64,
        )?;
        check(
            self.client_send_rate_hz > 0,
            "client_send_rate_hz",
            "positive",
            self.client_send_rate_hz as f64,
        )?;
        check(
            self.buffer_time_multiplier >= 1.0,
            "buffer_time_multiplier",
            "at least 1",
            self.buffer_time_multiplier,
        )?;
        check(
            self.buffer_limit >= 2,
            "buffer_limit",
            "at least 2",
            self.buffer_limit as f64,
        )?;
        check(
            self.dynamic_adjustment_tolerance >= 0.0,
            "dynamic_adjustment_tolerance",
            "non-negative",
            self.dynamic_adjustment_tolerance,
        )?;
        check(
            self.drift_ema_window_secs > 0.0,
            "drift_ema_window_secs",
            "positive",
            self.drift_ema_window_secs,
        )?;
        check(
            self.delivery_time_ema_window_secs > 0.0,
            "delivery_time_ema_window_secs",
            "positive",
            self.delivery_time_ema_window_secs,
        )?;
        check(
            self.catchup_speed > 1.0,
            "catchup_speed",
            "greater than 1",
            self.catchup_speed,
        )?;
        check(
            self.slowdown_speed > 0.0 && self.slowdown_speed < 1.0,
            "slowdown_speed",
            "between 0 and 1",
            self.slowdown_speed,
        )?;
        check(
            self.catchup_negative_threshold < 0.0,
            "catchup_negative_threshold",
            "negative",
            self.catchup_negative_threshold,
        )?;
        check(
            self.catchup_positive_threshold > 0.0,
            "catchup_positive_threshold",
            "positive",
            self.catchup_positive_threshold,
        )?;
        Ok(())
    }
}

/// Per-entity replication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSyncConfig {
    pub mode: ReplicationMode,
    pub sync: SyncFlags,
    /// Families that are interpolated; the rest snap to the newest pose.
    pub interpolate: SyncFlags,
    pub position_precision: f64,
    pub scale_precision: f64,
    /// Degrees.
    pub rotation_sensitivity: f32,
    pub compress_rotation: bool,
    pub only_sync_on_change: bool,
    pub only_sync_on_change_correction_multiplier: f64,
    pub send_interval_multiplier: u32,
    pub timeline_offset: bool,
    /// Send a full snapshot after this many entity ticks without one, even
    /// when idle and even in delta mode.
    pub rebaseline_interval: Option<u32>,
}

impl Default for TransformSyncConfig {
    fn default() -> Self {
        Self {
            mode: ReplicationMode::DeltaCompressed,
            sync: SyncFlags::POSITION | SyncFlags::ROTATION,
            interpolate: SyncFlags::all(),
            position_precision: 0.01,
            scale_precision: 0.01,
            rotation_sensitivity: 0.01,
            compress_rotation: true,
            only_sync_on_change: true,
            only_sync_on_change_correction_multiplier: 2.0,
            send_interval_multiplier: 1,
            timeline_offset: false,
            rebaseline_interval: None,
        }
    }
}

impl TransformSyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(
            self.position_precision >= MIN_PRECISION,
            "position_precision",
            "at least 1e-4",
            self.position_precision,
        )?;
        check(
            self.scale_precision >= MIN_PRECISION,
            "scale_precision",
            "at least 1e-4",
            self.scale_precision,
        )?;
        check(
            self.rotation_sensitivity >= 0.0,
            "rotation_sensitivity",
            "non-negative",
            self.rotation_sensitivity as f64,
        )?;
        check(
            self.only_sync_on_change_correction_multiplier > 0.0,
            "only_sync_on_change_correction_multiplier",
            "positive",
            self.only_sync_on_change_correction_multiplier,
        )?;
        check(
            self.send_interval_multiplier >= 1,
            "send_interval_multiplier",
            "at least 1",
            self.send_interval_multiplier as f64,
        )?;
        if let Some(interval) = self.rebaseline_interval {
            check(
                interval >= 1,
                "rebaseline_interval",
                "at least 1",
                interval as f64,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SnapshotSettings::default().validate().is_ok());
        assert!(TransformSyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_precision() {
        let config = TransformSyncConfig {
            position_precision: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "position_precision",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_nan_speeds() {
        let settings = SnapshotSettings {
            catchup_speed: f64::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = SnapshotSettings {
            slowdown_speed: 1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_send_intervals() {
        let settings = SnapshotSettings {
            server_send_rate_hz: 20,
            ..Default::default()
        };
        assert!((settings.server_send_interval() - 0.05).abs() < 1e-12);
        assert!((settings.drift_ema_window(20) - 20.0).abs() < 1e-12);
        assert!((settings.delivery_time_ema_window(20) - 40.0).abs() < 1e-12);
    }
}
