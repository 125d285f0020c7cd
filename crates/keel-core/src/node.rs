//! Compute node: identity, provider binding, interfaces, and its rolling
//! metric window.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{MetricKind, MetricSeries};
use crate::types::{signed_seconds, Id, NetworkInterface, NodeState, Provider};

/// Default metric retention: samples older than 60 s are evicted.
pub const DEFAULT_KEEP_METRIC_FOR_SECS: i64 = -60;

/// A compute node owned by an auto-scaling group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Id,
    pub provider: Provider,
    pub private_iface: NetworkInterface,
    pub public_iface: NetworkInterface,
    pub state: NodeState,
    pub metrics: MetricSeries,
    /// Age cutoff relative to "now", stored negative (e.g. -60 s). Samples
    /// with `timestamp < now + keep_metric_for` are evicted on every write.
    #[serde(with = "signed_seconds")]
    pub keep_metric_for: TimeDelta,
}

/// Nodes keyed by id; `BTreeMap` fixes iteration to lexicographic id order.
pub type NodeSet = BTreeMap<Id, Node>;

/// Build a node set from setup nodes.
pub fn node_set(nodes: impl IntoIterator<Item = Node>) -> NodeSet {
    nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
}

impl Node {
    /// Create a node with the given identity and interfaces.
    ///
    /// The node starts `Unhealthy`: it has proven nothing yet, and the
    /// policy upgrades it once its health window clears the threshold.
    pub fn setup(
        id: impl Into<Id>,
        provider: Provider,
        private_iface: NetworkInterface,
        public_iface: NetworkInterface,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            private_iface,
            public_iface,
            state: NodeState::Unhealthy,
            metrics: MetricSeries::new(),
            keep_metric_for: TimeDelta::seconds(DEFAULT_KEEP_METRIC_FOR_SECS),
        }
    }

    pub fn change_provider(&mut self, provider: Provider) {
        self.provider = provider;
    }

    pub fn change_network_interfaces(
        &mut self,
        private_iface: Option<NetworkInterface>,
        public_iface: Option<NetworkInterface>,
    ) {
        if let Some(iface) = private_iface {
            self.private_iface = iface;
        }
        if let Some(iface) = public_iface {
            self.public_iface = iface;
        }
    }

    /// Mark the node removed from its group.
    pub fn remove(&mut self) {
        self.state = NodeState::Deleted;
    }

    /// Evict expired samples, then merge the batch (last write wins at
    /// equal timestamps). Eviction is the only garbage collection the
    /// window has; there is no size cap.
    pub fn add_metrics(&mut self, batch: MetricSeries) {
        let cutoff = Utc::now() + self.keep_metric_for;
        self.metrics.evict_before(cutoff);
        self.metrics.merge(batch);
    }

    /// Mean of `kind` samples with `from < timestamp < to`, rounded
    /// half-up to two decimals; 0.0 when nothing contributes.
    pub fn calculate_metric_value(
        &self,
        kind: MetricKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> f64 {
        self.metrics.mean_in_window(kind, from, to)
    }
}
