//! RTT estimation.
//!
//! Classic TCP-style smoothing: the estimate and its mean deviation are
//! exponentially weighted moving averages, and the retransmission timeout is
//! `estimated + 4 * deviation`.

use std::time::Duration;

/// RTT smoothing constants.
pub mod constants {
    use std::time::Duration;

    /// Weight of a fresh sample in the smoothed estimate (1/8).
    pub const ALPHA: f64 = 0.125;

    /// Weight of a fresh deviation in the smoothed deviation (1/4).
    pub const BETA: f64 = 0.25;

    /// Deviation multiplier in the timeout.
    pub const K: f64 = 4.0;

    /// Smallest timeout ever handed to a channel.
    ///
    /// A zero receive timeout means "wait forever" for a socket.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);
}

/// Smoothed round-trip-time estimator.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT in milliseconds.
    estimated_ms: f64,
    /// Mean deviation in milliseconds.
    dev_ms: f64,
    /// Most recent raw sample.
    last_sample: Option<Duration>,
    /// Number of samples taken.
    samples: u64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(
            crate::core::constants::INITIAL_ESTIMATED_RTT,
            crate::core::constants::INITIAL_DEV_RTT,
        )
    }
}

impl RttEstimator {
    /// Create an estimator seeded with the given estimate and deviation.
    pub fn new(estimated: Duration, dev: Duration) -> Self {
        Self {
            estimated_ms: duration_to_ms(estimated),
            dev_ms: duration_to_ms(dev),
            last_sample: None,
            samples: 0,
        }
    }

    /// Fold one round-trip sample into the estimate and return the new timeout.
    ///
    /// The estimate moves first; the deviation is measured against the
    /// already-updated estimate.
    pub fn update(&mut self, sample: Duration) -> Duration {
        let sample_ms = duration_to_ms(sample);

        self.estimated_ms =
            self.estimated_ms * (1.0 - constants::ALPHA) + sample_ms * constants::ALPHA;
        self.dev_ms = self.dev_ms * (1.0 - constants::BETA)
            + (sample_ms - self.estimated_ms).abs() * constants::BETA;

        self.last_sample = Some(sample);
        self.samples += 1;
        self.timeout()
    }

    /// Retransmission timeout derived from the current estimate.
    pub fn timeout(&self) -> Duration {
        ms_to_duration(self.estimated_ms + constants::K * self.dev_ms).max(constants::MIN_TIMEOUT)
    }

    /// Smoothed RTT.
    pub fn estimated(&self) -> Duration {
        ms_to_duration(self.estimated_ms)
    }

    /// Smoothed RTT in whole milliseconds (truncated).
    pub fn estimated_ms(&self) -> u32 {
        self.estimated_ms as u32
    }

    /// Smoothed deviation.
    pub fn dev(&self) -> Duration {
        ms_to_duration(self.dev_ms)
    }

    /// Most recent raw sample, if any.
    pub fn current_rtt(&self) -> Option<Duration> {
        self.last_sample
    }

    /// Number of samples folded in so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}

fn duration_to_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn ms_to_duration(ms: f64) -> Duration {
    if ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}
