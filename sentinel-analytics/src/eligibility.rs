//! Flag eligibility evaluator
//!
//! For each relay and each tracked flag, compares the relay's measured
//! values against authority-vote thresholds (median of reporting
//! authorities) or documented fallback constants. Recomputed fully each
//! cycle; a missing vote never drops a row, it downgrades its source.

use chrono::{DateTime, Utc};

use sentinel_core::feeds::ConsensusDoc;
use sentinel_core::{
    FlagEligibility, MeasurementSource, RelayEntity, RelayFlag, Verdict, FALLBACK_FAST_SPEED,
    FALLBACK_GUARD_BANDWIDTH, FALLBACK_GUARD_TK, FALLBACK_GUARD_WFU, FALLBACK_STABLE_MTBF,
    HSDIR_TIME_KNOWN,
};

/// One metric's threshold after resolving votes against fallbacks.
struct ResolvedThreshold {
    value: f64,
    source: MeasurementSource,
    vote_count: u32,
}

fn resolve<T: Into<f64> + PartialOrd + Copy>(
    consensus: Option<&ConsensusDoc>,
    fallback: f64,
    extract: impl Fn(&sentinel_core::feeds::FlagThresholds) -> Option<T>,
) -> ResolvedThreshold {
    if let Some(doc) = consensus {
        let (threshold, vote_count) = doc.vote_threshold(&extract);
        if let Some(value) = threshold {
            return ResolvedThreshold {
                value: value.into(),
                source: MeasurementSource::AuthorityVote,
                vote_count,
            };
        }
    }
    ResolvedThreshold {
        value: fallback,
        source: MeasurementSource::SelfReported,
        vote_count: 0,
    }
}

/// Verdict rule: below if clearly under; partial when the vote quorum is
/// unmet or an optional secondary dimension is incomplete; meets otherwise.
fn verdict(
    measured: f64,
    threshold: &ResolvedThreshold,
    authority_total: u32,
    secondary_incomplete: bool,
) -> Verdict {
    if measured < threshold.value {
        return Verdict::Below;
    }
    if threshold.source == MeasurementSource::AuthorityVote
        && threshold.vote_count < FlagEligibility::quorum(authority_total)
    {
        return Verdict::Partial;
    }
    if secondary_incomplete {
        return Verdict::Partial;
    }
    Verdict::Meets
}

fn row(
    flag: RelayFlag,
    metric: &str,
    measured: f64,
    threshold: ResolvedThreshold,
    authority_total: u32,
    secondary_incomplete: bool,
) -> FlagEligibility {
    let verdict = verdict(measured, &threshold, authority_total, secondary_incomplete);
    FlagEligibility {
        flag,
        metric: metric.to_string(),
        measured,
        threshold: threshold.value,
        source: threshold.source,
        verdict,
        authority_vote_count: threshold.vote_count,
        authority_total,
    }
}

/// Evaluate all tracked flags for one relay.
pub fn evaluate_relay(
    relay: &RelayEntity,
    consensus: Option<&ConsensusDoc>,
    now: DateTime<Utc>,
) -> Vec<FlagEligibility> {
    let authority_total = consensus.map(|d| d.authorities.len() as u32).unwrap_or(0);
    let time_known = relay.time_known_secs(now) as f64;
    let running_fraction = relay
        .uptime
        .as_ref()
        .map(|u| u.running_fraction)
        .unwrap_or(0.0);
    // Weighted mean time between failures, approximated from the uptime
    // history over the relay's known lifetime.
    let mtbf = running_fraction * time_known;

    // Guard's optional secondary dimension: a published IPv6 OR port that
    // the consensus has not (yet) confirmed reachable.
    let ipv6_incomplete = relay.has_ipv6_address() && relay.ipv6_confirmed.is_none();

    vec![
        row(
            RelayFlag::Fast,
            "observed_bandwidth",
            relay.observed_bandwidth as f64,
            resolve(consensus, FALLBACK_FAST_SPEED as f64, |t| {
                t.fast_speed.map(|v| v as f64)
            }),
            authority_total,
            false,
        ),
        row(
            RelayFlag::Stable,
            "weighted_mtbf",
            mtbf,
            resolve(consensus, FALLBACK_STABLE_MTBF as f64, |t| {
                t.stable_mtbf.map(|v| v as f64)
            }),
            authority_total,
            false,
        ),
        row(
            RelayFlag::Guard,
            "weighted_fractional_uptime",
            running_fraction,
            resolve(consensus, FALLBACK_GUARD_WFU, |t| t.guard_wfu),
            authority_total,
            ipv6_incomplete,
        ),
        row(
            RelayFlag::Guard,
            "time_known",
            time_known,
            resolve(consensus, FALLBACK_GUARD_TK as f64, |t| {
                t.guard_tk.map(|v| v as f64)
            }),
            authority_total,
            ipv6_incomplete,
        ),
        row(
            RelayFlag::Guard,
            "bandwidth_inc_exits",
            relay.observed_bandwidth as f64,
            resolve(consensus, FALLBACK_GUARD_BANDWIDTH as f64, |t| {
                t.guard_bw_inc_exits.map(|v| v as f64)
            }),
            authority_total,
            ipv6_incomplete,
        ),
        // HSDir has no vote-derived threshold; time-known only.
        row(
            RelayFlag::HSDir,
            "time_known",
            time_known,
            ResolvedThreshold {
                value: HSDIR_TIME_KNOWN as f64,
                source: MeasurementSource::SelfReported,
                vote_count: 0,
            },
            authority_total,
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sentinel_core::feeds::{AuthorityVote, FlagThresholds};
    use sentinel_core::{Fingerprint, UptimeSummary};
    use std::collections::HashMap;

    fn relay() -> RelayEntity {
        let mut relay = RelayEntity::new(
            Fingerprint::parse("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap(),
        );
        relay.observed_bandwidth = 5 * 1024 * 1024;
        relay.or_addresses = vec!["203.0.113.5:9001".to_string()];
        relay.first_seen = Some(Utc::now() - Duration::days(100));
        relay.uptime = Some(UptimeSummary {
            running_fraction: 0.995,
            flag_fractions: HashMap::new(),
            fetched_at: Utc::now(),
        });
        relay
    }

    fn consensus(voting: usize, total: usize, fast_speed: u64) -> ConsensusDoc {
        let authorities = (0..total)
            .map(|i| AuthorityVote {
                name: format!("auth{i}"),
                address: format!("203.0.113.{i}:80"),
                thresholds: (i < voting).then(|| FlagThresholds {
                    fast_speed: Some(fast_speed),
                    stable_mtbf: Some(150_000),
                    guard_wfu: Some(0.98),
                    guard_tk: Some(8 * 86_400),
                    guard_bw_inc_exits: Some(2 * 1024 * 1024),
                    stable_uptime: None,
                }),
            })
            .collect();
        ConsensusDoc {
            valid_after: Utc::now(),
            fresh_until: Utc::now(),
            valid_until: Utc::now(),
            method: 28,
            authorities,
            relays: Vec::new(),
        }
    }

    fn find(rows: &[FlagEligibility], flag: RelayFlag, metric: &str) -> FlagEligibility {
        rows.iter()
            .find(|r| r.flag == flag && r.metric == metric)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_bandwidth_meets_and_below() {
        // Measured 125 units against threshold 100 meets; 80 is below.
        let doc = consensus(9, 9, 100);
        let mut r = relay();
        r.observed_bandwidth = 125;
        let rows = evaluate_relay(&r, Some(&doc), Utc::now());
        let fast = find(&rows, RelayFlag::Fast, "observed_bandwidth");
        assert_eq!(fast.verdict, Verdict::Meets);
        assert_eq!(fast.source, MeasurementSource::AuthorityVote);
        assert_eq!(fast.authority_vote_count, 9);

        r.observed_bandwidth = 80;
        let rows = evaluate_relay(&r, Some(&doc), Utc::now());
        assert_eq!(
            find(&rows, RelayFlag::Fast, "observed_bandwidth").verdict,
            Verdict::Below
        );
    }

    #[test]
    fn test_below_quorum_votes_yield_partial() {
        // 3 of 9 authorities reporting: quorum (5) unmet => partial.
        let doc = consensus(3, 9, 100);
        let mut r = relay();
        r.observed_bandwidth = 125;
        let rows = evaluate_relay(&r, Some(&doc), Utc::now());
        let fast = find(&rows, RelayFlag::Fast, "observed_bandwidth");
        assert_eq!(fast.verdict, Verdict::Partial);
        assert_eq!(fast.authority_vote_count, 3);
        assert_eq!(fast.authority_total, 9);
    }

    #[test]
    fn test_no_consensus_falls_back_to_self_reported() {
        let rows = evaluate_relay(&relay(), None, Utc::now());
        for row in &rows {
            assert_eq!(row.source, MeasurementSource::SelfReported);
            assert_eq!(row.authority_vote_count, 0);
        }
        // Rows are never dropped: all tracked metrics present.
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_guard_ipv6_secondary_dimension() {
        let doc = consensus(9, 9, 100);
        let mut r = relay();
        r.or_addresses.push("[2001:db8::5]:9001".to_string());
        // IPv6 published but unconfirmed => partial even though base meets.
        let rows = evaluate_relay(&r, Some(&doc), Utc::now());
        let wfu = find(&rows, RelayFlag::Guard, "weighted_fractional_uptime");
        assert_eq!(wfu.verdict, Verdict::Partial);

        // Confirmation resolves it.
        r.ipv6_confirmed = Some(true);
        let rows = evaluate_relay(&r, Some(&doc), Utc::now());
        let wfu = find(&rows, RelayFlag::Guard, "weighted_fractional_uptime");
        assert_eq!(wfu.verdict, Verdict::Meets);
    }

    #[test]
    fn test_hsdir_time_known() {
        let mut r = relay();
        r.first_seen = Some(Utc::now() - Duration::hours(50));
        let rows = evaluate_relay(&r, None, Utc::now());
        assert_eq!(
            find(&rows, RelayFlag::HSDir, "time_known").verdict,
            Verdict::Below
        );

        r.first_seen = Some(Utc::now() - Duration::hours(100));
        let rows = evaluate_relay(&r, None, Utc::now());
        assert_eq!(
            find(&rows, RelayFlag::HSDir, "time_known").verdict,
            Verdict::Meets
        );
    }
}
