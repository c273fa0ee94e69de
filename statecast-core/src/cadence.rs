//! Send cadence: how long the dispatch worker waits before heartbeating
//!
//! Two independent knobs:
//! - the heartbeat interval, fast while an authorization attempt is in flight
//!   so the newly authorized state reaches the collector quickly, slow once
//!   steady;
//! - the throttle floor, a fixed sleep after every send that bounds the
//!   outbound request rate no matter how often producers write.

use std::time::{Duration, Instant};

use crate::config::ReporterConfig;

/// Pure cadence decisions for the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadencePolicy {
    /// Heartbeat interval once steady
    pub heartbeat: Duration,
    /// Heartbeat interval during a recent authorization attempt
    pub connecting_heartbeat: Duration,
    /// How long after it started an authorization attempt counts as recent
    pub connection_window: Duration,
    /// Minimum spacing between consecutive sends
    pub throttle: Duration,
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self::from_config(&ReporterConfig::default())
    }
}

impl CadencePolicy {
    pub fn from_config(config: &ReporterConfig) -> Self {
        Self {
            heartbeat: config.heartbeat(),
            connecting_heartbeat: config.connecting_heartbeat(),
            connection_window: config.connection_window(),
            throttle: config.throttle(),
        }
    }

    /// Whether an authorization attempt started recently enough to fast-poll
    pub fn is_connecting(&self, attempt_started_at: Option<Instant>, now: Instant) -> bool {
        attempt_started_at
            .map(|started| now.saturating_duration_since(started) < self.connection_window)
            .unwrap_or(false)
    }

    /// How long to wait for a new snapshot before heartbeating
    ///
    /// The steady interval is shortened by the throttle floor, which the
    /// worker has already slept through after its previous send.
    pub fn next_wait(&self, attempt_started_at: Option<Instant>, now: Instant) -> Duration {
        if self.is_connecting(attempt_started_at, now) {
            self.connecting_heartbeat
        } else {
            self.heartbeat.saturating_sub(self.throttle)
        }
    }

    /// Wait before re-checking for a token while a snapshot is held back
    ///
    /// Zero: the throttle sleep that ends every cycle already spaces the
    /// checks one throttle floor apart.
    pub fn token_poll(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_heartbeat_excludes_throttle() {
        let policy = CadencePolicy::default();
        let now = Instant::now();
        assert_eq!(policy.next_wait(None, now), Duration::from_secs(59));
    }

    #[test]
    fn test_recent_attempt_fast_polls() {
        let policy = CadencePolicy::default();
        let started = Instant::now();
        let now = started + Duration::from_secs(60);

        assert!(policy.is_connecting(Some(started), now));
        assert_eq!(policy.next_wait(Some(started), now), Duration::from_secs(5));
    }

    #[test]
    fn test_stale_attempt_falls_back_to_steady() {
        let policy = CadencePolicy::default();
        let started = Instant::now();
        let now = started + Duration::from_secs(5 * 60);

        assert!(!policy.is_connecting(Some(started), now));
        assert_eq!(policy.next_wait(Some(started), now), Duration::from_secs(59));
    }

    #[test]
    fn test_attempt_in_the_future_counts_as_recent() {
        let policy = CadencePolicy::default();
        let now = Instant::now();
        let started = now + Duration::from_secs(1);
        assert!(policy.is_connecting(Some(started), now));
    }

    #[test]
    fn test_throttle_longer_than_heartbeat_saturates() {
        let policy = CadencePolicy {
            heartbeat: Duration::from_millis(500),
            throttle: Duration::from_secs(1),
            ..CadencePolicy::default()
        };
        assert_eq!(policy.next_wait(None, Instant::now()), Duration::ZERO);
        assert_eq!(policy.token_poll(), Duration::ZERO);
    }

    #[test]
    fn test_from_config() {
        let config = ReporterConfig {
            heartbeat_ms: 2_000,
            connecting_heartbeat_ms: 250,
            connection_window_secs: 10,
            throttle_ms: 100,
            ..ReporterConfig::default()
        };
        let policy = CadencePolicy::from_config(&config);
        assert_eq!(policy.heartbeat, Duration::from_secs(2));
        assert_eq!(policy.connecting_heartbeat, Duration::from_millis(250));
        assert_eq!(policy.connection_window, Duration::from_secs(10));
        assert_eq!(policy.throttle, Duration::from_millis(100));
    }
}
