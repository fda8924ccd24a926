//! Connection configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use super::retry::RetryPolicy;
use crate::core::constants::{INITIAL_DEV_RTT, INITIAL_ESTIMATED_RTT, WAIT_TIME};

/// Tunables of a single connection.
///
/// The defaults are the protocol constants; both endpoints interoperate with
/// any combination of values, but the timing ones change how quickly loss is
/// detected and how long the close initiator lingers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Smoothed RTT before the first sample.
    pub initial_estimated_rtt: Duration,

    /// RTT deviation before the first sample.
    pub initial_dev_rtt: Duration,

    /// Length of the close initiator's time-wait window.
    pub wait_time: Duration,

    /// How often one segment may be retransmitted.
    pub retry: RetryPolicy,

    /// Address a listening connection binds to.
    pub listen_ip: IpAddr,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            initial_estimated_rtt: INITIAL_ESTIMATED_RTT,
            initial_dev_rtt: INITIAL_DEV_RTT,
            wait_time: WAIT_TIME,
            retry: RetryPolicy::unbounded(),
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl ConnectionConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new()
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            config: ConnectionConfig::default(),
        }
    }

    /// Set the initial RTT estimate.
    pub fn initial_estimated_rtt(mut self, rtt: Duration) -> Self {
        self.config.initial_estimated_rtt = rtt;
        self
    }

    /// Set the initial RTT deviation.
    pub fn initial_dev_rtt(mut self, dev: Duration) -> Self {
        self.config.initial_dev_rtt = dev;
        self
    }

    /// Set the time-wait window.
    pub fn wait_time(mut self, wait_time: Duration) -> Self {
        self.config.wait_time = wait_time;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Cap every exchange at `max_attempts` transmissions.
    pub fn max_attempts(self, max_attempts: u32) -> Self {
        self.retry(RetryPolicy::bounded(max_attempts))
    }

    /// Set the address listening connections bind to.
    pub fn listen_ip(mut self, ip: IpAddr) -> Self {
        self.config.listen_ip = ip;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

impl Default for ConnectionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let config = ConnectionConfig::default();
        assert_eq!(config.initial_estimated_rtt, Duration::from_millis(100));
        assert_eq!(config.initial_dev_rtt, Duration::from_millis(10));
        assert_eq!(config.wait_time, Duration::from_millis(4000));
        assert_eq!(config.retry.max_attempts(), None);
        assert!(config.listen_ip.is_unspecified());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::builder()
            .initial_estimated_rtt(Duration::from_millis(50))
            .initial_dev_rtt(Duration::from_millis(5))
            .wait_time(Duration::from_millis(200))
            .max_attempts(8)
            .listen_ip(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .build();

        assert_eq!(config.initial_estimated_rtt, Duration::from_millis(50));
        assert_eq!(config.initial_dev_rtt, Duration::from_millis(5));
        assert_eq!(config.wait_time, Duration::from_millis(200));
        assert_eq!(config.retry, RetryPolicy::bounded(8));
        assert_eq!(config.listen_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_builder_default_equals_config_default() {
        assert_eq!(ConnectionConfigBuilder::default().build(), ConnectionConfig::default());
    }
}
