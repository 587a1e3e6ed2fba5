//! Alert generator
//!
//! Turns threshold breaches from the health monitor and the eligibility
//! evaluator into a deduplicated, leveled alert list. A condition that is
//! still breaching refreshes its existing alert instead of emitting a new
//! one; a condition that clears drops the alert on the next evaluation.

use std::collections::HashMap;

use tracing::{info, warn};

use sentinel_core::{Alert, AlertCategory, AlertLevel, AuthorityStatus, RelayFlag};

use crate::{Freshness, NetworkIndicators};

/// Unreachable (offline or timed-out) authority count that is critical.
pub const UNREACHABLE_AUTHORITY_CRITICAL: usize = 3;

/// Authority latency above this is worth a warning (milliseconds).
pub const LATENCY_WARNING_MS: u64 = 2_000;

/// Exit-flagged relay population below this is a capacity warning.
pub const EXIT_POPULATION_WARNING: usize = 500;

/// Fraction of Guard relays scoring below on Guard metrics that is
/// worth a warning.
pub const GUARD_REGRESSION_WARNING: f64 = 0.5;

/// Everything the generator looks at in one cycle.
pub struct AlertInputs<'a> {
    pub statuses: &'a [AuthorityStatus],
    pub indicators: &'a NetworkIndicators,
    /// Fraction of Guard-flagged relays whose Guard metrics verdict Below
    pub guard_below_fraction: f64,
}

/// Stateful, deduplicating alert generator. One instance lives across
/// cycles so first-observed timestamps survive refreshes.
#[derive(Default)]
pub struct AlertGenerator {
    active: HashMap<(AlertCategory, String), Alert>,
}

impl AlertGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate all thresholds and return the current alert list,
    /// ordered by level then subject for stable downstream diffing.
    pub fn evaluate(&mut self, inputs: &AlertInputs<'_>) -> Vec<Alert> {
        let mut triggered: Vec<Alert> = Vec::new();

        let unreachable = inputs
            .statuses
            .iter()
            .filter(|s| s.status.is_unreachable())
            .count();
        if unreachable >= UNREACHABLE_AUTHORITY_CRITICAL {
            triggered.push(Alert::new(
                AlertLevel::Critical,
                AlertCategory::AuthorityReachability,
                "network",
                format!(
                    "{unreachable} of {} directory authorities unreachable",
                    inputs.statuses.len()
                ),
            ));
        }

        for status in inputs.statuses {
            if let Some(latency) = status.latency_ms {
                if latency > LATENCY_WARNING_MS {
                    triggered.push(Alert::new(
                        AlertLevel::Warning,
                        AlertCategory::AuthorityReachability,
                        &status.name,
                        format!("authority {} responding in {latency} ms", status.name),
                    ));
                }
            }
        }

        match inputs.indicators.freshness {
            Freshness::Stale | Freshness::Unknown => triggered.push(Alert::new(
                AlertLevel::Critical,
                AlertCategory::ConsensusFreshness,
                "consensus",
                format!("consensus is {:?}", inputs.indicators.freshness).to_lowercase(),
            )),
            Freshness::Future => triggered.push(Alert::new(
                AlertLevel::Warning,
                AlertCategory::ConsensusFreshness,
                "consensus",
                "consensus validity window starts in the future".to_string(),
            )),
            Freshness::Current => {}
        }

        if let Some(&exits) = inputs.indicators.flag_counts.get(&RelayFlag::Exit) {
            if exits < EXIT_POPULATION_WARNING {
                triggered.push(Alert::new(
                    AlertLevel::Warning,
                    AlertCategory::NetworkCapacity,
                    "Exit",
                    format!("only {exits} exit relays in the consensus"),
                ));
            }
        }

        if inputs.guard_below_fraction > GUARD_REGRESSION_WARNING {
            triggered.push(Alert::new(
                AlertLevel::Warning,
                AlertCategory::FlagEligibility,
                "Guard",
                format!(
                    "{:.0}% of Guard relays below Guard thresholds",
                    inputs.guard_below_fraction * 100.0
                ),
            ));
        }

        self.reconcile(triggered)
    }

    /// Merge triggered conditions into the active set: refresh existing
    /// alerts, admit new ones, clear the rest.
    fn reconcile(&mut self, triggered: Vec<Alert>) -> Vec<Alert> {
        let mut next: HashMap<(AlertCategory, String), Alert> = HashMap::new();

        for alert in triggered {
            let key = alert.key();
            match self.active.remove(&key) {
                Some(mut existing) => {
                    // Same condition still breaching: keep its identity
                    // and first-observed time, refresh the message.
                    existing.still_active = true;
                    existing.level = alert.level;
                    existing.message = alert.message;
                    next.insert(key, existing);
                }
                None => {
                    warn!(
                        "Alert raised [{:?}/{}]: {}",
                        alert.category, alert.subject, alert.message
                    );
                    next.insert(key, alert);
                }
            }
        }

        for (key, alert) in self.active.drain() {
            info!("Alert cleared [{:?}/{}]", key.0, alert.subject);
        }
        self.active = next;

        let mut alerts: Vec<Alert> = self.active.values().cloned().collect();
        alerts.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.subject.cmp(&b.subject))
        });
        alerts
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_core::ReachStatus;
    use std::collections::HashMap as StdHashMap;

    fn status(name: &str, reach: ReachStatus, latency: Option<u64>) -> AuthorityStatus {
        AuthorityStatus {
            name: name.to_string(),
            status: reach,
            latency_ms: latency,
            last_checked: Utc::now(),
            capability_flags: Vec::new(),
        }
    }

    fn indicators(freshness: Freshness, exits: usize) -> NetworkIndicators {
        let mut flag_counts = StdHashMap::new();
        flag_counts.insert(RelayFlag::Exit, exits);
        NetworkIndicators {
            freshness,
            consensus_age_secs: Some(60),
            flag_counts,
            total_consensus_bandwidth: 1_000_000,
            authorities_reachable: 9,
            authorities_total: 9,
        }
    }

    fn healthy_inputs<'a>(
        statuses: &'a [AuthorityStatus],
        indicators: &'a NetworkIndicators,
    ) -> AlertInputs<'a> {
        AlertInputs {
            statuses,
            indicators,
            guard_below_fraction: 0.0,
        }
    }

    #[test]
    fn test_quiet_network_raises_nothing() {
        let statuses = vec![status("moria1", ReachStatus::Online, Some(40))];
        let ind = indicators(Freshness::Current, 2_000);
        let mut generator = AlertGenerator::new();
        assert!(generator.evaluate(&healthy_inputs(&statuses, &ind)).is_empty());
    }

    #[test]
    fn test_unreachable_authorities_critical() {
        let statuses = vec![
            status("a", ReachStatus::Offline, None),
            status("b", ReachStatus::Timeout, None),
            status("c", ReachStatus::Timeout, None),
            status("d", ReachStatus::Online, Some(30)),
        ];
        let ind = indicators(Freshness::Current, 2_000);
        let mut generator = AlertGenerator::new();
        let alerts = generator.evaluate(&healthy_inputs(&statuses, &ind));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].category, AlertCategory::AuthorityReachability);
    }

    #[test]
    fn test_latency_warning_per_authority() {
        let statuses = vec![
            status("moria1", ReachStatus::Slow, Some(2_500)),
            status("tor26", ReachStatus::Online, Some(30)),
        ];
        let ind = indicators(Freshness::Current, 2_000);
        let mut generator = AlertGenerator::new();
        let alerts = generator.evaluate(&healthy_inputs(&statuses, &ind));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].subject, "moria1");
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn test_alert_idempotence_and_clearing() {
        let breaching = vec![status("moria1", ReachStatus::Slow, Some(2_500))];
        let recovered = vec![status("moria1", ReachStatus::Online, Some(30))];
        let ind = indicators(Freshness::Current, 2_000);
        let mut generator = AlertGenerator::new();

        let first = generator.evaluate(&healthy_inputs(&breaching, &ind));
        assert_eq!(first.len(), 1);
        let first_observed = first[0].first_observed;
        let id = first[0].id.clone();

        // Same breach again: no duplicate, same identity and timestamp.
        let second = generator.evaluate(&healthy_inputs(&breaching, &ind));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, id);
        assert_eq!(second[0].first_observed, first_observed);

        // Condition cleared: alert gone next cycle.
        let third = generator.evaluate(&healthy_inputs(&recovered, &ind));
        assert!(third.is_empty());
        assert_eq!(generator.active_count(), 0);
    }

    #[test]
    fn test_consensus_freshness_alerts() {
        let statuses = vec![status("moria1", ReachStatus::Online, Some(30))];
        let mut generator = AlertGenerator::new();

        let stale = indicators(Freshness::Stale, 2_000);
        let alerts = generator.evaluate(&healthy_inputs(&statuses, &stale));
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].category, AlertCategory::ConsensusFreshness);

        let future = indicators(Freshness::Future, 2_000);
        let alerts = generator.evaluate(&healthy_inputs(&statuses, &future));
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn test_capacity_and_guard_regression() {
        let statuses = vec![status("moria1", ReachStatus::Online, Some(30))];
        let ind = indicators(Freshness::Current, 320);
        let mut generator = AlertGenerator::new();
        let alerts = generator.evaluate(&AlertInputs {
            statuses: &statuses,
            indicators: &ind,
            guard_below_fraction: 0.62,
        });
        assert_eq!(alerts.len(), 2);
        assert!(alerts
            .iter()
            .any(|a| a.category == AlertCategory::NetworkCapacity));
        assert!(alerts
            .iter()
            .any(|a| a.category == AlertCategory::FlagEligibility && a.subject == "Guard"));
    }
}
