//! Rolling stats over the trade window (§3): count/sum/mean/median/MAD/min/
//! max/variance/stdDev. Mean and variance use Welford's online algorithm
//! (grounded on the numerically-stable rolling-stats pattern the teacher
//! uses for per-signal-family statistics); median/MAD are computed from an
//! explicit sorted copy, matching the robust z-score definition exactly
//! rather than approximating it from the Welford accumulator.

use serde::{Deserialize, Serialize};

use super::robust::{mad, median};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingStats {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    pub mad: f64,
    pub min: f64,
    pub max: f64,
    pub variance: f64,
    pub std_dev: f64,
}

impl RollingStats {
    /// Recomputes all stats from the current window contents. The window is
    /// already bounded (trimmed to the last hour) so a full recompute per
    /// trigger is cheap relative to a streaming accumulator that would need
    /// eviction support Welford doesn't provide.
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return RollingStats {
                count: 0,
                sum: 0.0,
                mean: 0.0,
                median: 0.0,
                mad: 0.0,
                min: 0.0,
                max: 0.0,
                variance: 0.0,
                std_dev: 0.0,
            };
        }

        let mut w = Welford::default();
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in values {
            w.push(v);
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let variance = w.variance();

        RollingStats {
            count: values.len() as u64,
            sum,
            mean: w.mean,
            median: median(values),
            mad: mad(values),
            min,
            max,
            variance,
            std_dev: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_all_zero() {
        let stats = RollingStats::compute(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn matches_known_moments() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = RollingStats::compute(&values);
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.variance - 4.0).abs() < 1e-9);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
    }
}
