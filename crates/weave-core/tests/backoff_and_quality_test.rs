//! Tests for the shared backoff formula and connection-quality classification.

use std::time::Duration;

use weave_core::{
    classify_quality, BackoffPolicy, ConnectionHints, ConnectionQuality, CoordinatorConfig,
    EffectiveType, NetworkStatus,
};

/// delay(n) == min(base * factor^n, max) across a range of policies.
#[test]
fn test_backoff_matches_closed_form() {
    let policies = [
        BackoffPolicy::default(),
        BackoffPolicy::exponential(Duration::from_millis(250)),
        BackoffPolicy::exponential(Duration::from_millis(100))
            .with_factor(3)
            .with_max_delay(Duration::from_secs(60)),
    ];

    for policy in policies {
        for n in 0..12u32 {
            let base = policy.base_delay.as_millis() as u128;
            let expected = (base * (policy.factor as u128).pow(n))
                .min(policy.max_delay.as_millis() as u128);
            assert_eq!(
                policy.delay_for(n).as_millis(),
                expected,
                "policy {policy:?} attempt {n}"
            );
        }
    }
}

#[test]
fn test_backoff_never_exceeds_cap_for_huge_attempts() {
    let policy = BackoffPolicy::default();
    assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
}

#[test]
fn test_config_backoff_matches_reconnect_defaults() {
    let config = CoordinatorConfig::default();
    let delays: Vec<_> = (0..config.retry.max_attempts)
        .map(|n| config.retry.backoff.delay_for(n))
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

/// Offline wins over every other hint.
#[test]
fn test_offline_classification_ignores_other_hints() {
    let types = [
        None,
        Some(EffectiveType::Slow2g),
        Some(EffectiveType::TwoG),
        Some(EffectiveType::ThreeG),
        Some(EffectiveType::FourG),
    ];
    for effective_type in types {
        for downlink in [None, Some(0.1), Some(50.0)] {
            for rtt in [None, Some(10), Some(5000)] {
                let hints = ConnectionHints {
                    is_online: false,
                    effective_type,
                    downlink_mbps: downlink,
                    round_trip_ms: rtt,
                    data_saver: None,
                };
                assert_eq!(classify_quality(&hints), ConnectionQuality::Offline);
                assert!(!NetworkStatus::from_hints(&hints).is_slow);
            }
        }
    }
}

#[test]
fn test_classification_is_deterministic() {
    let hints = ConnectionHints::online()
        .with_effective_type(EffectiveType::ThreeG)
        .with_downlink(0.8)
        .with_rtt(700);
    let first = classify_quality(&hints);
    for _ in 0..10 {
        assert_eq!(classify_quality(&hints), first);
    }
    assert_eq!(first, ConnectionQuality::Fair);
}

#[test]
fn test_online_without_hints_is_poor_but_not_slow() {
    let status = NetworkStatus::from_hints(&ConnectionHints::online());
    assert_eq!(status.quality, ConnectionQuality::Poor);
    assert!(!status.is_slow);
}
