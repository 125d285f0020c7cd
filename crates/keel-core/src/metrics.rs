//! Rolling time-keyed metric samples and window aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The metric kinds a series can be queried by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// 1.0 = healthy, 0.0 = unhealthy at that sample.
    Health,
}

/// A single sample. One variant per kind; all variants carry a value and
/// the instant it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    Health {
        value: f64,
        timestamp: DateTime<Utc>,
    },
}

impl Metric {
    pub fn health(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self::Health { value, timestamp }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Health { .. } => MetricKind::Health,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Self::Health { value, .. } => *value,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Health { timestamp, .. } => *timestamp,
        }
    }
}

/// Time-keyed sample window. At most one sample per distinct timestamp;
/// inserting at an existing timestamp overwrites (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries(BTreeMap<DateTime<Utc>, Metric>);

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Metric>) -> Self {
        let mut series = Self::new();
        for sample in samples {
            series.insert(sample);
        }
        series
    }

    pub fn insert(&mut self, sample: Metric) {
        self.0.insert(sample.timestamp(), sample);
    }

    /// Merge another series in, keyed by timestamp (last write wins).
    pub fn merge(&mut self, other: MetricSeries) {
        for (timestamp, sample) in other.0 {
            self.0.insert(timestamp, sample);
        }
    }

    /// Drop every sample strictly older than `cutoff`.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        self.0 = std::mem::take(&mut self.0).split_off(&cutoff);
    }

    /// Arithmetic mean of samples of `kind` with `from < timestamp < to`
    /// (strict on both ends), rounded half-up to two decimal places.
    /// Returns 0.0 when no sample contributes or the running sum is zero.
    pub fn mean_in_window(&self, kind: MetricKind, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let mut sum = 0.0;
        let mut count = 0u32;
        for (timestamp, sample) in &self.0 {
            if sample.kind() != kind {
                continue;
            }
            if *timestamp > from && *timestamp < to {
                sum += sample.value();
                count += 1;
            }
        }

        let mut mean = 0.0;
        if sum > 0.0 {
            mean = sum / f64::from(count);
        }

        round_half_up(mean, 2)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Metric)> {
        self.0.iter()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.0.keys()
    }
}

/// Round `value` to `places` decimal places, ties away from zero upward.
pub fn round_half_up(value: f64, places: u32) -> f64 {
    let pow = 10f64.powi(places as i32);
    let digit = pow * value;
    let rounded = if digit.fract() >= 0.5 {
        digit.ceil()
    } else {
        digit.floor()
    };
    rounded / pow
}
