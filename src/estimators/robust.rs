//! Robust z-score via median + MAD, and percentile rank (§3, §4.2).

/// `1 / Phi^-1(3/4)`, the constant that makes MAD a consistent estimator of
/// the standard deviation under normality.
const MAD_SCALE: f64 = 1.4826;

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    median_of_sorted(&sorted)
}

pub fn mad(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Robust z-score (§4.2): `n<10` returns 0; `MAD=0` returns 0 at the median
/// and `±∞` by sign otherwise; else `(x-median)/(1.4826*MAD)`.
pub fn robust_z_score(x: f64, values: &[f64]) -> f64 {
    if values.len() < 10 {
        return 0.0;
    }
    let med = median(values);
    let m = mad(values);
    if m == 0.0 {
        return if x == med {
            0.0
        } else if x > med {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    (x - med) / (MAD_SCALE * m)
}

/// Fraction of `values` that are `<= x`, in `[0, 1]`.
pub fn percentile_rank(x: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count_le = values.iter().filter(|&&v| v <= x).count();
    count_le as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn z_score_requires_minimum_sample() {
        let small: Vec<f64> = (0..9).map(|i| i as f64).collect();
        assert_eq!(robust_z_score(100.0, &small), 0.0);
    }

    #[test]
    fn z_score_zero_mad_handles_extremes_by_sign() {
        let constant = vec![5.0; 10];
        assert_eq!(robust_z_score(5.0, &constant), 0.0);
        assert_eq!(robust_z_score(6.0, &constant), f64::INFINITY);
        assert_eq!(robust_z_score(4.0, &constant), f64::NEG_INFINITY);
    }

    #[test]
    fn z_score_normal_case() {
        let values: Vec<f64> = vec![10.0, 12.0, 11.0, 13.0, 10.0, 11.0, 12.0, 10.0, 11.0, 12.0];
        let z = robust_z_score(50.0, &values);
        assert!(z > 0.0);
    }

    #[test]
    fn percentile_rank_bounds() {
        let values: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert_eq!(percentile_rank(0.0, &values), 0.0);
        assert_eq!(percentile_rank(10.0, &values), 1.0);
        assert!((percentile_rank(5.0, &values) - 0.5).abs() < 1e-9);
    }
}
