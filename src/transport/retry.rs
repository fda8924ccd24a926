//! Retry policy and per-exchange exponential backoff.

use std::time::Duration;

use super::error::{TransportError, TransportResult};

/// How many times one logical segment may be transmitted.
///
/// The default is unbounded: a peer that never answers keeps the exchange
/// retrying forever. A bounded policy turns that into
/// [`TransportError::RetriesExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever.
    pub const fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Give up after `max_attempts` transmissions (at least one).
    pub const fn bounded(max_attempts: u32) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    /// Attempt limit, `None` when unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether another transmission is allowed after `attempts` so far.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

/// Backoff state of a single exchange.
///
/// Starts at the RTT-derived timeout; every expiry doubles the deadline that
/// was actually in effect. Nothing carries over to the next exchange.
#[derive(Debug, Clone)]
pub struct Backoff {
    timeout: Duration,
    attempts: u32,
    policy: RetryPolicy,
}

impl Backoff {
    /// Begin an exchange with the given initial deadline.
    pub fn new(initial: Duration, policy: RetryPolicy) -> Self {
        Self {
            timeout: initial,
            attempts: 0,
            policy,
        }
    }

    /// Deadline of the current attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transmissions so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one transmission.
    pub fn on_transmit(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// The deadline elapsed with no reply: double it, or give up.
    pub fn on_expiry(&mut self) -> TransportResult<Duration> {
        if !self.policy.allows_retry(self.attempts) {
            return Err(TransportError::RetriesExhausted {
                attempts: self.attempts,
            });
        }
        self.timeout = self.timeout.saturating_mul(2);
        Ok(self.timeout)
    }

    /// Fail if the policy forbids another transmission.
    ///
    /// Used by exchanges that resend on an arrival rather than on expiry.
    pub fn check_retry(&self) -> TransportResult<()> {
        if self.policy.allows_retry(self.attempts) {
            Ok(())
        } else {
            Err(TransportError::RetriesExhausted {
                attempts: self.attempts,
            })
        }
    }
}
