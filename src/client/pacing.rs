//! Adaptive pacing for piece requests and upload responses.
//!
//! Once per sampling interval the client rescales the current delay by
//! `measured / ceiling`, so the one-request-at-a-time cadence drifts toward
//! the configured bandwidth ceiling. This is a coarse best-effort limiter,
//! not a token bucket: with a single in-flight piece the achievable
//! granularity is one piece per delay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Interval between pacing recomputations and speed samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Delay applied before any throughput has been measured.
pub const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Smallest non-zero delay; rescaling never collapses below this.
pub const MIN_DELAY: Duration = Duration::from_micros(100);

/// Largest delay; kept just under the recompute interval so at least one
/// request fits between samples.
pub const MAX_DELAY: Duration = Duration::from_millis(950);

/// Shared view of the current pacing delays.
///
/// The client recomputes the delays on its sampling tick; each `Content`
/// reads the download delay on its request path before dispatching the
/// next reservation.
#[derive(Debug)]
pub struct RequestPacer {
    download_delay_micros: AtomicU64,
    upload_delay_micros: AtomicU64,
}

impl RequestPacer {
    pub fn new() -> Self {
        Self {
            download_delay_micros: AtomicU64::new(INITIAL_DELAY.as_micros() as u64),
            upload_delay_micros: AtomicU64::new(INITIAL_DELAY.as_micros() as u64),
        }
    }

    /// Minimum spacing before the next piece request.
    pub fn download_delay(&self) -> Duration {
        Duration::from_micros(self.download_delay_micros.load(Ordering::Relaxed))
    }

    /// Minimum spacing before serving the next upload response.
    pub fn upload_delay(&self) -> Duration {
        Duration::from_micros(self.upload_delay_micros.load(Ordering::Relaxed))
    }

    pub(crate) fn set_download_delay(&self, delay: Duration) {
        self.download_delay_micros
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_upload_delay(&self, delay: Duration) {
        self.upload_delay_micros
            .store(delay.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the next request delay from the measured throughput.
///
/// No ceiling means uncapped, so the delay is zero. A measured throughput
/// of zero keeps the previous delay (nothing moved, nothing to learn).
/// Otherwise the previous delay is scaled by `measured / ceiling`, floored
/// at [`MIN_DELAY`] and capped at [`MAX_DELAY`].
pub fn next_delay(measured_bps: f64, ceiling_bps: Option<u64>, previous: Duration) -> Duration {
    let Some(ceiling) = ceiling_bps.filter(|ceiling| *ceiling > 0) else {
        return Duration::ZERO;
    };

    if measured_bps == 0.0 {
        return previous;
    }

    let change = measured_bps / ceiling as f64;

    if (previous.is_zero() && change > 0.0) || previous < MIN_DELAY {
        return MIN_DELAY;
    }

    let scaled = previous.mul_f64(change);
    if scaled > SAMPLE_INTERVAL {
        tracing::warn!(
            "Configured transfer ceiling is too low for one-piece-at-a-time pacing to track reliably"
        );
        return MAX_DELAY;
    }

    scaled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ceiling_means_no_delay() {
        assert_eq!(
            next_delay(1_000_000.0, None, Duration::from_millis(500)),
            Duration::ZERO
        );
        assert_eq!(
            next_delay(1_000_000.0, Some(0), Duration::from_millis(500)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_zero_throughput_keeps_previous_delay() {
        let previous = Duration::from_millis(250);
        assert_eq!(next_delay(0.0, Some(100_000), previous), previous);
    }

    #[test]
    fn test_throughput_at_ceiling_holds_steady() {
        let previous = Duration::from_millis(500);
        let next = next_delay(100_000.0, Some(100_000), previous);
        assert_eq!(next, previous);
    }

    #[test]
    fn test_throughput_above_ceiling_grows_delay() {
        let previous = Duration::from_millis(400);
        let next = next_delay(200_000.0, Some(100_000), previous);
        assert_eq!(next, Duration::from_millis(800));
    }

    #[test]
    fn test_runaway_scale_clamps_to_max() {
        let next = next_delay(1_000_000.0, Some(1_000), Duration::from_millis(500));
        assert_eq!(next, MAX_DELAY);
    }

    #[test]
    fn test_collapsed_delay_recovers_to_minimum() {
        let next = next_delay(50_000.0, Some(100_000), Duration::ZERO);
        assert_eq!(next, MIN_DELAY);

        let next = next_delay(50_000.0, Some(100_000), Duration::from_micros(5));
        assert_eq!(next, MIN_DELAY);
    }

    #[test]
    fn test_pacer_shared_delay_round_trip() {
        let pacer = RequestPacer::new();
        assert_eq!(pacer.download_delay(), INITIAL_DELAY);

        pacer.set_download_delay(Duration::from_millis(10));
        assert_eq!(pacer.download_delay(), Duration::from_millis(10));

        pacer.set_upload_delay(Duration::ZERO);
        assert_eq!(pacer.upload_delay(), Duration::ZERO);
    }
}
