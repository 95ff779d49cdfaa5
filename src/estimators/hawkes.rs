//! Hawkes-style self-exciting intensity estimator for arrival-rate bursts
//! (§3, §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HawkesState {
    pub baseline_intensity: f64,
    pub alpha: f64,
    pub beta: f64,
    pub intensity: f64,
    pub last_event_time_ms: Option<i64>,
    pub event_count: u64,
}

impl Default for HawkesState {
    fn default() -> Self {
        Self {
            baseline_intensity: 0.1,
            alpha: 0.5,
            beta: 0.1,
            intensity: 0.1,
            last_event_time_ms: None,
            event_count: 0,
        }
    }
}

impl HawkesState {
    /// Decays intensity toward baseline and applies the self-excitation jump
    /// for an event observed at `t_ms`.
    pub fn record_event(&mut self, t_ms: i64) {
        if let Some(last) = self.last_event_time_ms {
            let dt_seconds = (t_ms - last).max(0) as f64 / 1000.0;
            self.intensity = self.baseline_intensity
                + (self.intensity - self.baseline_intensity) * (-self.beta * dt_seconds).exp();
        }
        self.intensity += self.alpha;
        self.last_event_time_ms = Some(t_ms);
        self.event_count += 1;
    }

    /// Current intensity at `t_ms`, decay only, does not record an event.
    pub fn current_intensity(&self, t_ms: i64) -> f64 {
        match self.last_event_time_ms {
            None => self.baseline_intensity,
            Some(last) => {
                let dt_seconds = (t_ms - last).max(0) as f64 / 1000.0;
                self.baseline_intensity
                    + (self.intensity - self.baseline_intensity) * (-self.beta * dt_seconds).exp()
            }
        }
    }

    pub fn is_burst(&self, t_ms: i64, k: f64) -> bool {
        self.current_intensity(t_ms) > k * self.baseline_intensity
    }

    /// `clamp((ratio-1)/4, 0, 1)` where `ratio = intensity/baseline`.
    pub fn burst_score(&self, t_ms: i64) -> f64 {
        if self.baseline_intensity <= 0.0 {
            return 0.0;
        }
        let ratio = self.current_intensity(t_ms) / self.baseline_intensity;
        ((ratio - 1.0) / 4.0).clamp(0.0, 1.0)
    }

    pub fn intensity_per_hour(&self, t_ms: i64) -> f64 {
        self.current_intensity(t_ms) * 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_spec_constants() {
        let s = HawkesState::default();
        assert_eq!(s.baseline_intensity, 0.1);
        assert_eq!(s.alpha, 0.5);
        assert_eq!(s.beta, 0.1);
    }

    #[test]
    fn event_jumps_then_decays() {
        let mut s = HawkesState::default();
        s.record_event(0);
        assert!((s.intensity - 0.6).abs() < 1e-9);

        // 10s later, no new event: decays toward baseline.
        let decayed = s.current_intensity(10_000);
        assert!(decayed < 0.6 && decayed > 0.1);
    }

    #[test]
    fn burst_detection_threshold() {
        let mut s = HawkesState::default();
        for t in [0, 500, 900, 1200, 1400] {
            s.record_event(t);
        }
        assert!(s.is_burst(1400, 2.0));
        assert!(s.burst_score(1400) > 0.0);
    }

    #[test]
    fn round_trip_serialization() {
        let mut s = HawkesState::default();
        s.record_event(1000);
        let json = serde_json::to_string(&s).unwrap();
        let back: HawkesState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
