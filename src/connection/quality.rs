//! Heartbeat-derived connection quality.
//!
//! # Design Decisions
//! - Rating is observability only; it never drives reconnects
//! - Consecutive misses are tracked separately from the rolling window so
//!   the supervisor can treat a run of missed heartbeats as a drop

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Rolling window of heartbeat outcomes. `None` is a missed heartbeat.
#[derive(Debug)]
pub struct QualityMonitor {
    capacity: usize,
    samples: VecDeque<Option<Duration>>,
    consecutive_misses: u32,
}

impl QualityMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
            consecutive_misses: 0,
        }
    }

    pub fn record_success(&mut self, rtt: Duration) {
        self.consecutive_misses = 0;
        self.push(Some(rtt));
    }

    /// Returns the number of consecutive misses including this one.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_misses += 1;
        self.push(None);
        self.consecutive_misses
    }

    fn push(&mut self, sample: Option<Duration>) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.consecutive_misses = 0;
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn success_ratio(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let ok = self.samples.iter().filter(|s| s.is_some()).count();
        Some(ok as f64 / self.samples.len() as f64)
    }

    /// Mean round-trip over successful heartbeats.
    pub fn average_rtt(&self) -> Option<Duration> {
        let rtts: Vec<Duration> = self.samples.iter().flatten().copied().collect();
        if rtts.is_empty() {
            return None;
        }
        Some(rtts.iter().sum::<Duration>() / rtts.len() as u32)
    }

    pub fn rating(&self) -> ConnectionQuality {
        let Some(success) = self.success_ratio() else {
            return ConnectionQuality::Good;
        };
        if success < 0.5 {
            return ConnectionQuality::Poor;
        }
        let Some(avg) = self.average_rtt() else {
            return ConnectionQuality::Poor;
        };
        let avg_ms = avg.as_millis();
        if avg_ms < 100 && success >= 0.95 {
            ConnectionQuality::Excellent
        } else if avg_ms < 300 && success >= 0.8 {
            ConnectionQuality::Good
        } else if avg_ms < 1000 {
            ConnectionQuality::Fair
        } else {
            ConnectionQuality::Poor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_no_samples_is_good() {
        assert_eq!(QualityMonitor::new(10).rating(), ConnectionQuality::Good);
    }

    #[test]
    fn test_rating_thresholds() {
        let mut m = QualityMonitor::new(10);
        for _ in 0..10 {
            m.record_success(ms(50));
        }
        assert_eq!(m.rating(), ConnectionQuality::Excellent);

        let mut m = QualityMonitor::new(10);
        for _ in 0..10 {
            m.record_success(ms(200));
        }
        assert_eq!(m.rating(), ConnectionQuality::Good);

        let mut m = QualityMonitor::new(10);
        for _ in 0..10 {
            m.record_success(ms(700));
        }
        assert_eq!(m.rating(), ConnectionQuality::Fair);

        let mut m = QualityMonitor::new(10);
        for _ in 0..10 {
            m.record_success(ms(1500));
        }
        assert_eq!(m.rating(), ConnectionQuality::Poor);
    }

    #[test]
    fn test_low_success_ratio_is_poor() {
        let mut m = QualityMonitor::new(4);
        m.record_success(ms(10));
        m.record_failure();
        m.record_failure();
        m.record_failure();
        assert_eq!(m.rating(), ConnectionQuality::Poor);
    }

    #[test]
    fn test_fast_but_lossy_drops_to_fair() {
        let mut m = QualityMonitor::new(10);
        for _ in 0..7 {
            m.record_success(ms(50));
        }
        for _ in 0..3 {
            m.record_failure();
        }
        assert_eq!(m.rating(), ConnectionQuality::Fair);
    }

    #[test]
    fn test_window_is_bounded_and_misses_reset() {
        let mut m = QualityMonitor::new(3);
        assert_eq!(m.record_failure(), 1);
        assert_eq!(m.record_failure(), 2);
        m.record_success(ms(10));
        assert_eq!(m.consecutive_misses(), 0);
        m.record_success(ms(10));
        m.record_success(ms(10));
        assert_eq!(m.success_ratio(), Some(1.0));
    }
}
