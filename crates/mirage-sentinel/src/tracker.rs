//! Per-address sliding windows and alert cooldown.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Window and cooldown parameters
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub rate_threshold: u32,
    pub rate_window: Duration,
    pub auth_limit: u32,
    pub auth_window: Duration,
    pub cooldown: Duration,
}

/// Tracked state for one source address.
///
/// The rate and auth-failure windows keep independent origins so one
/// resetting never disturbs the other.
#[derive(Debug, Clone)]
pub struct AttackerState {
    pub request_count: u32,
    pub auth_failure_count: u32,
    pub rate_window_start: DateTime<Utc>,
    pub auth_window_start: DateTime<Utc>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub alerts_sent: u32,
}

impl AttackerState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            request_count: 0,
            auth_failure_count: 0,
            rate_window_start: now,
            auth_window_start: now,
            last_alert_at: None,
            alerts_sent: 0,
        }
    }
}

/// Shared map of attacker states. Writes dominate during a burst, so the
/// map sits behind a plain reader/writer lock rather than anything fancier.
pub struct AttackerTracker {
    config: WindowConfig,
    states: RwLock<HashMap<String, AttackerState>>,
}

impl AttackerTracker {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Count a processed line against the address's request window.
    /// Returns (window breached, current count).
    pub fn note_request(&self, ip: &str, now: DateTime<Utc>) -> (bool, u32) {
        let mut states = self.states.write();
        let state = states
            .entry(ip.to_string())
            .or_insert_with(|| AttackerState::new(now));

        if now - state.rate_window_start > self.config.rate_window {
            state.rate_window_start = now;
            state.request_count = 1;
        } else {
            state.request_count += 1;
        }

        (state.request_count > self.config.rate_threshold, state.request_count)
    }

    /// Count an auth-failure line against the address's failure window.
    /// Returns (window breached, current count).
    pub fn note_auth_failure(&self, ip: &str, now: DateTime<Utc>) -> (bool, u32) {
        let mut states = self.states.write();
        let state = states
            .entry(ip.to_string())
            .or_insert_with(|| AttackerState::new(now));

        if now - state.auth_window_start > self.config.auth_window {
            state.auth_window_start = now;
            state.auth_failure_count = 1;
        } else {
            state.auth_failure_count += 1;
        }

        (
            state.auth_failure_count > self.config.auth_limit,
            state.auth_failure_count,
        )
    }

    /// Whether alerts for this address are currently suppressed. Cooldown
    /// starts at the last successful dispatch, so a failed dispatch leaves
    /// the next breach free to retry.
    pub fn in_cooldown(&self, ip: &str, now: DateTime<Utc>) -> bool {
        let states = self.states.read();
        states
            .get(ip)
            .and_then(|s| s.last_alert_at)
            .map(|t| now - t < self.config.cooldown)
            .unwrap_or(false)
    }

    /// Record a successful dispatch for this address.
    pub fn mark_alerted(&self, ip: &str, now: DateTime<Utc>) {
        let mut states = self.states.write();
        let state = states
            .entry(ip.to_string())
            .or_insert_with(|| AttackerState::new(now));
        state.last_alert_at = Some(now);
        state.alerts_sent += 1;
    }

    #[cfg(test)]
    pub fn get(&self, ip: &str) -> Option<AttackerState> {
        self.states.read().get(ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WindowConfig {
        WindowConfig {
            rate_threshold: 50,
            rate_window: Duration::seconds(60),
            auth_limit: 3,
            auth_window: Duration::seconds(60),
            cooldown: Duration::seconds(300),
        }
    }

    #[test]
    fn test_rate_threshold_boundary() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        for _ in 0..50 {
            let (breached, _) = tracker.note_request("10.0.0.9", now);
            assert!(!breached);
        }

        let (breached, count) = tracker.note_request("10.0.0.9", now);
        assert!(breached);
        assert_eq!(count, 51);
    }

    #[test]
    fn test_rate_window_resets() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        for _ in 0..50 {
            tracker.note_request("10.0.0.9", now);
        }

        // Past the window the counter restarts, so no breach
        let later = now + Duration::seconds(61);
        let (breached, count) = tracker.note_request("10.0.0.9", later);
        assert!(!breached);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_auth_window_independent_of_rate_window() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        tracker.note_auth_failure("10.0.0.9", now);
        tracker.note_auth_failure("10.0.0.9", now);

        // A rate-window reset must not clear the auth counter
        let later = now + Duration::seconds(61);
        tracker.note_request("10.0.0.9", later);

        let (breached, count) = tracker.note_auth_failure("10.0.0.9", now + Duration::seconds(30));
        assert!(!breached);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_auth_breach_at_limit_plus_one() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        for i in 1..=3 {
            let (breached, count) = tracker.note_auth_failure("10.0.0.9", now);
            assert!(!breached);
            assert_eq!(count, i);
        }

        let (breached, count) = tracker.note_auth_failure("10.0.0.9", now);
        assert!(breached);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_cooldown_only_after_successful_dispatch() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        // No alert yet: nothing suppressed
        assert!(!tracker.in_cooldown("10.0.0.9", now));

        tracker.mark_alerted("10.0.0.9", now);
        assert!(tracker.in_cooldown("10.0.0.9", now + Duration::seconds(299)));
        assert!(!tracker.in_cooldown("10.0.0.9", now + Duration::seconds(300)));

        let state = tracker.get("10.0.0.9").unwrap();
        assert_eq!(state.alerts_sent, 1);
    }

    #[test]
    fn test_addresses_tracked_separately() {
        let tracker = AttackerTracker::new(config());
        let now = Utc::now();

        tracker.mark_alerted("10.0.0.9", now);
        assert!(tracker.in_cooldown("10.0.0.9", now));
        assert!(!tracker.in_cooldown("10.0.0.10", now));
    }
}
