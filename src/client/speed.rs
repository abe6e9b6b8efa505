//! Sliding-window throughput estimators for the client's rate meters.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bytes-per-second meter over a fixed trailing window.
///
/// Samples older than the window are pruned on every access, so an idle
/// meter decays to zero instead of remembering a historical burst.
#[derive(Debug)]
pub struct SpeedEstimator {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    window_total: u64,
}

impl SpeedEstimator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            window_total: 0,
        }
    }

    /// Records a transferred chunk.
    pub fn record(&mut self, bytes: u64) {
        let now = Instant::now();
        self.prune(now);
        self.samples.push_back((now, bytes));
        self.window_total += bytes;
    }

    /// Returns the current throughput estimate in bytes per second.
    pub fn bytes_per_second(&mut self) -> f64 {
        self.prune(Instant::now());
        self.window_total as f64 / self.window.as_secs_f64()
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, bytes)) = self.samples.front() {
            if now.duration_since(*at) <= self.window {
                break;
            }
            self.window_total -= bytes;
            self.samples.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_meter_reads_zero() {
        let mut meter = SpeedEstimator::new(Duration::from_secs(1));
        assert_eq!(meter.bytes_per_second(), 0.0);
    }

    #[test]
    fn test_throughput_is_window_total_over_window() {
        let mut meter = SpeedEstimator::new(Duration::from_secs(2));
        meter.record(1000);
        meter.record(3000);
        // 4000 bytes over a 2 second window.
        assert_eq!(meter.bytes_per_second(), 2000.0);
    }

    #[test]
    fn test_old_samples_fall_out_of_the_window() {
        let mut meter = SpeedEstimator::new(Duration::from_millis(10));
        meter.record(10_000);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(meter.bytes_per_second(), 0.0);
    }
}
