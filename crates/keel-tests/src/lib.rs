//! Shared fixtures for the Keel integration scenarios.

#![forbid(unsafe_code)]

use chrono::{DateTime, TimeDelta, Utc};
use keel_core::{
    DesiredHealthyNodeAmountPerProvider, Metric, MetricSeries, NetworkInterface, Node, Provider,
    ScalingPolicy,
};

pub fn local_provider() -> Provider {
    Provider {
        id: "local".to_string(),
        api_key: "some-key".to_string(),
        ..Provider::default()
    }
}

/// A node bound to the local provider with the standard test interfaces.
pub fn test_node(id: &str) -> Node {
    Node::setup(
        id,
        local_provider(),
        NetworkInterface::new("eth0", "192.100.10.1".parse().unwrap()),
        NetworkInterface::new("eth0", "192.100.10.2".parse().unwrap()),
    )
}

/// The standard scenario policy: 5 s trailing window, threshold 0.7.
pub fn health_policy(
    min: u32,
    max: u32,
    desired: u32,
    consecutive_checks: u32,
) -> ScalingPolicy {
    ScalingPolicy::DesiredHealthyPerProvider(
        DesiredHealthyNodeAmountPerProvider::new(
            "policy-1",
            min,
            max,
            desired,
            consecutive_checks,
            0.7,
            TimeDelta::seconds(-5),
            local_provider(),
        )
        .expect("valid policy"),
    )
}

/// Five samples anchored at `base`, the oldest `failing` of them zero.
///
/// Re-anchoring every round at the same `base` overwrites the previous
/// round's samples (one sample per timestamp), so each evaluation sees
/// exactly one five-sample window without sleeping between ticks.
pub fn tick_window(base: DateTime<Utc>, failing: usize) -> MetricSeries {
    MetricSeries::from_samples((0..5).map(|i| {
        let value = if i >= 5 - failing { 0.0 } else { 1.0 };
        Metric::health(
            value,
            base - TimeDelta::milliseconds(100) - TimeDelta::seconds(i as i64),
        )
    }))
}
