use snapsync::{ConfigError, LinkConditions, SnapshotSettings, TransformSyncConfig};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub settings: SnapshotSettings,
    pub transform: TransformSyncConfig,
    pub link: LinkConditions,
    pub frame_rate: u32,
    pub duration_secs: f64,
    pub seed: u64,
    /// Radius of the circle the replicated entity moves on.
    pub radius: f32,
    /// Radians per second along that circle.
    pub angular_speed: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            settings: SnapshotSettings::default(),
            transform: TransformSyncConfig::default(),
            link: LinkConditions::default(),
            frame_rate: 120,
            duration_secs: 10.0,
            seed: 0,
            radius: 5.0,
            angular_speed: 1.0,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.transform.validate()
    }

    pub fn frame_time(&self) -> f64 {
        1.0 / self.frame_rate.max(1) as f64
    }

    pub fn frames(&self) -> u64 {
        (self.duration_secs.max(0.0) * self.frame_rate as f64).round() as u64
    }
}
