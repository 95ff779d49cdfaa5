//! CUSUM cumulative-sum change-point detector (§3, §4.2).

use serde::{Deserialize, Serialize};

const VARIANCE_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CusumState {
    pub n: u64,
    pub sum_x: f64,
    pub sum_x2: f64,
    pub max_stat: f64,
    pub change_point_index: Option<u64>,
    pub last_value: Option<f64>,
    pub threshold: f64,
    pub pre_mean: Option<f64>,
}

impl CusumState {
    pub fn new(threshold: f64) -> Self {
        Self {
            n: 0,
            sum_x: 0.0,
            sum_x2: 0.0,
            max_stat: 0.0,
            change_point_index: None,
            last_value: None,
            threshold,
            pre_mean: None,
        }
    }
}

impl Default for CusumState {
    fn default() -> Self {
        // Matches the threshold used elsewhere in the detection pipeline;
        // callers with a different regime should construct via `new`.
        Self::new(5.0)
    }
}

/// Result of a single CUSUM update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CusumResult {
    pub detected: bool,
    pub statistic: f64,
    pub change_point_index: Option<u64>,
}

impl CusumState {
    /// Standardizes `x` by the running mean (or `pre_mean` if provided) and
    /// sample variance (floored), accumulates `S_n = max(0, S_{n-1} + z)`,
    /// and latches `change_point_index` on the first threshold crossing.
    pub fn update(&mut self, x: f64) -> CusumResult {
        self.n += 1;
        self.sum_x += x;
        self.sum_x2 += x * x;

        let mean = self.pre_mean.unwrap_or_else(|| self.sum_x / self.n as f64);
        let variance = if self.n > 1 {
            ((self.sum_x2 / self.n as f64) - mean * mean).max(VARIANCE_FLOOR)
        } else {
            VARIANCE_FLOOR
        };
        let std_dev = variance.sqrt();
        let z = (x - mean) / std_dev;

        self.max_stat = (self.max_stat + z).max(0.0);
        self.last_value = Some(x);

        let detected = self.max_stat > self.threshold;
        if detected && self.change_point_index.is_none() {
            self.change_point_index = Some(self.n);
        }

        CusumResult {
            detected,
            statistic: self.max_stat,
            change_point_index: self.change_point_index,
        }
    }
}
