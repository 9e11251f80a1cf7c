use serde::{Deserialize, Serialize};

/// Running mean and variance over an irregular stream of samples.
///
/// `n` is the number of samples that form one smoothing window. The first
/// sample seeds the mean; later samples move it by `alpha * delta` and fold
/// `delta` into an exponentially weighted variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    n: f64,
    value: f64,
    variance: f64,
    standard_deviation: f64,
    initialized: bool,
}

impl ExponentialMovingAverage {
    pub fn new(sample_window: f64) -> Self {
        Self {
            alpha: 2.0 / (sample_window + 1.0),
            n: sample_window,
            value: 0.0,
            variance: 0.0,
            standard_deviation: 0.0,
            initialized: false,
        }
    }

    pub fn add(&mut self, sample: f64) {
        if self.initialized {
            let delta = sample - self.value;
            self.value += self.alpha * delta;
            self.variance = (1.0 - self.alpha) * (self.variance + self.alpha * delta * delta);
            self.standard_deviation = self.variance.sqrt();
        } else {
            self.value = sample;
            self.variance = 0.0;
            self.standard_deviation = 0.0;
            self.initialized = true;
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn standard_deviation(&self) -> f64 {
        self.standard_deviation
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn window(&self) -> f64 {
        self.n
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.n);
    }
}
