//! Online latency statistics

use serde::Serialize;

/// Smoothing factor for the latency moving average.
pub const EMA_ALPHA: f64 = 0.3;

/// Exponential moving average plus Welford running variance.
///
/// The average is seeded at 0, so early values are biased low. Jitter is
/// the sample standard deviation of every recorded latency, 0 until two
/// samples exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    ema: f64,
    count: u64,
    mean: f64,
    m2: f64,
    last: Option<f64>,
}

impl LatencyStats {
    /// Empty accumulators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample (milliseconds) into both accumulators.
    pub fn record(&mut self, sample_ms: f64) {
        self.ema = EMA_ALPHA * sample_ms + (1.0 - EMA_ALPHA) * self.ema;

        self.count += 1;
        let delta = sample_ms - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample_ms - self.mean);

        self.last = Some(sample_ms);
    }

    /// Smoothed latency.
    pub fn ema(&self) -> f64 {
        self.ema
    }

    /// Sample standard deviation.
    pub fn jitter(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    /// Arithmetic mean of all samples.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Number of samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}
