//! Line classification and alert flow.

use chrono::{DateTime, Utc};
use mirage_common::{Alert, AttackKind};

use crate::config::AppConfig;
use crate::dispatch::AlertDispatcher;
use crate::rules::RuleSet;
use crate::tracker::AttackerTracker;

/// Ties the rule set, the attacker tracker and the dispatcher together.
/// One instance is shared by every tail worker.
pub struct Engine {
    config: AppConfig,
    rules: RuleSet,
    tracker: AttackerTracker,
    dispatcher: AlertDispatcher,
}

impl Engine {
    pub fn new(
        config: AppConfig,
        rules: RuleSet,
        tracker: AttackerTracker,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            config,
            rules,
            tracker,
            dispatcher,
        }
    }

    /// Classify one line against the rule set, updating the address's
    /// windows. Evaluation order: SQLi, path traversal, auth brute-force
    /// (marker lines only), rate abuse. At most one record per line.
    fn classify(
        &self,
        line: &str,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> Option<(AttackKind, String)> {
        // Every processed line counts against the request window
        let (rate_breached, request_count) = self.tracker.note_request(source_ip, now);

        if self.rules.matches_sqli(line) {
            return Some((AttackKind::Sqli, line.to_string()));
        }

        if self.rules.matches_path_traversal(line) {
            return Some((AttackKind::PathTraversal, line.to_string()));
        }

        if self.rules.is_auth_failure(line) {
            let (breached, failures) = self.tracker.note_auth_failure(source_ip, now);
            return breached.then(|| {
                (
                    AttackKind::AuthBruteforce,
                    format!(
                        "Multiple auth failures: {failures} in {}s",
                        self.config.auth_failure_window_secs
                    ),
                )
            });
        }

        if rate_breached {
            return Some((
                AttackKind::RateAbuse,
                format!(
                    "Request rate: {request_count} requests in {}s",
                    self.config.rate_limit_window_secs
                ),
            ));
        }

        None
    }

    /// Process one log line: extract the source, classify, and dispatch at
    /// most one alert, honoring the per-address cooldown.
    ///
    /// Lines without a source address are discarded without touching any
    /// state.
    pub async fn process_line(&self, line: &str, pod_name: &str) {
        let Some(source_ip) = self.rules.extract_source_ip(line) else {
            return;
        };

        let now = Utc::now();
        let Some((kind, evidence)) = self.classify(line, &source_ip, now) else {
            return;
        };

        if self.tracker.in_cooldown(&source_ip, now) {
            tracing::debug!(
                action = "alert_suppressed",
                source_ip = %source_ip,
                attack_type = %kind,
                "Detection within cooldown window"
            );
            return;
        }

        let alert = Alert::new(kind, source_ip.clone(), evidence, pod_name.to_string());

        tracing::info!(
            action = "attack_detected",
            source_ip = %source_ip,
            attack_type = %kind,
            severity = %alert.severity,
            pod = %pod_name,
            "Dispatching alert"
        );

        match self.dispatcher.send(&alert).await {
            Ok(()) => {
                // Cooldown only advances on a successful dispatch so a
                // failed delivery gets retried by the next breach
                self.tracker.mark_alerted(&source_ip, Utc::now());
            }
            Err(e) => {
                tracing::warn!(
                    action = "alert_dispatch_failed",
                    source_ip = %source_ip,
                    error = %e,
                    "Alert not delivered; cooldown not advanced"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let config = AppConfig::default();
        let tracker = AttackerTracker::new(config.windows());
        let dispatcher = AlertDispatcher::new("http://localhost:0/api/alerts".into()).unwrap();
        Engine::new(config, RuleSet::new().unwrap(), tracker, dispatcher)
    }

    #[test]
    fn test_sqli_wins_over_other_rules() {
        let e = engine();
        let now = Utc::now();

        // A line that is both an auth failure and SQLi classifies as SQLi
        let line = "401 unauthorized for id=1' OR '1'='1";
        let (kind, evidence) = e.classify(line, "10.0.0.9", now).unwrap();
        assert_eq!(kind, AttackKind::Sqli);
        assert_eq!(evidence, line);
    }

    #[test]
    fn test_auth_marker_without_breach_is_silent() {
        let e = engine();
        let now = Utc::now();

        for _ in 0..3 {
            assert!(e.classify("login failed for bob", "10.0.0.9", now).is_none());
        }

        let (kind, evidence) = e.classify("login failed for bob", "10.0.0.9", now).unwrap();
        assert_eq!(kind, AttackKind::AuthBruteforce);
        assert!(evidence.contains("Multiple auth failures: 4"));
    }

    #[test]
    fn test_rate_abuse_fires_past_threshold() {
        let e = engine();
        let now = Utc::now();

        for _ in 0..50 {
            assert!(e.classify("GET /api/products", "10.0.0.99", now).is_none());
        }

        let (kind, evidence) = e.classify("GET /api/products", "10.0.0.99", now).unwrap();
        assert_eq!(kind, AttackKind::RateAbuse);
        assert!(evidence.contains("Request rate: 51 requests"));
    }

    #[test]
    fn test_traversal_line_does_not_consume_auth_window() {
        let e = engine();
        let now = Utc::now();

        let (kind, _) = e
            .classify("GET /files?name=../../etc/passwd", "10.0.0.9", now)
            .unwrap();
        assert_eq!(kind, AttackKind::PathTraversal);

        // The traversal line counted as a request but not as an auth failure
        for _ in 0..3 {
            assert!(e.classify("login failed", "10.0.0.9", now).is_none());
        }
    }
}
