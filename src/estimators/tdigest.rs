//! A small sorted-buffer percentile sketch for the trade-size stream (§3).
//!
//! No teacher file implements a quantile sketch; this follows the same
//! "small serializable struct with an update/query pair" shape as the
//! Hawkes and CUSUM estimators beside it rather than a borrowed pattern.
//! Bounded retention keeps memory flat per token; insertion is O(log n) via
//! binary search into a sorted `Vec`.

use serde::{Deserialize, Serialize};

const DEFAULT_CAPACITY: usize = 2048;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeDigest {
    sorted: Vec<f64>,
    capacity: usize,
}

impl Default for SizeDigest {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SizeDigest {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sorted: Vec::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Inserts `x`, dropping the oldest-inserted half when at capacity. We
    /// approximate "oldest" by evicting the element nearest the median,
    /// which preserves tail resolution (the part quantiles 0.95+ care about)
    /// better than evicting from either end.
    pub fn insert(&mut self, x: f64) {
        if self.sorted.len() >= self.capacity {
            let mid = self.sorted.len() / 2;
            self.sorted.remove(mid);
        }
        let idx = self
            .sorted
            .partition_point(|&v| v < x);
        self.sorted.insert(idx, x);
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Quantile in `[0, 1]`; `None` on an empty digest.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }
        let q = q.clamp(0.0, 1.0);
        let idx = ((self.sorted.len() - 1) as f64 * q).round() as usize;
        self.sorted.get(idx).copied()
    }

    pub fn quantiles(&self) -> Option<[f64; 4]> {
        Some([
            self.quantile(0.5)?,
            self.quantile(0.95)?,
            self.quantile(0.99)?,
            self.quantile(0.999)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_has_no_quantiles() {
        let d = SizeDigest::default();
        assert_eq!(d.quantile(0.5), None);
    }

    #[test]
    fn quantiles_track_uniform_distribution() {
        let mut d = SizeDigest::default();
        for i in 1..=1000 {
            d.insert(i as f64);
        }
        let median = d.quantile(0.5).unwrap();
        assert!((median - 500.0).abs() < 5.0);
        let p99 = d.quantile(0.99).unwrap();
        assert!(p99 > 980.0);
    }

    #[test]
    fn respects_capacity_bound() {
        let mut d = SizeDigest::with_capacity(100);
        for i in 0..500 {
            d.insert(i as f64);
        }
        assert!(d.len() <= 100);
    }
}
