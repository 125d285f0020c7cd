//! Scaling policies: health evaluation, consecutive-failure hysteresis,
//! and command synthesis.

use std::collections::BTreeMap;

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::{Command, CommandPlan, Order};
use crate::error::{CoreError, CoreResult};
use crate::metrics::MetricKind;
use crate::node::NodeSet;
use crate::types::{signed_seconds, Id, NodeState, Provider};

/// A scaling policy attached to an ASG. Tagged variant so plans and group
/// snapshots serialize without runtime type information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalingPolicy {
    DesiredHealthyPerProvider(DesiredHealthyNodeAmountPerProvider),
}

impl ScalingPolicy {
    pub fn id(&self) -> &Id {
        match self {
            Self::DesiredHealthyPerProvider(p) => &p.id,
        }
    }

    /// Evaluate the group's nodes and append any required commands to the
    /// plan. Append-only: existing plan entries are never touched.
    pub fn evaluate(&mut self, nodes: &mut NodeSet, plan: &mut CommandPlan) -> CoreResult<()> {
        match self {
            Self::DesiredHealthyPerProvider(p) => p.evaluate(nodes, plan),
        }
    }

    /// Replace this policy's parameters with another revision of the same
    /// policy. Per-node failure counters survive the swap.
    pub fn update(&mut self, other: ScalingPolicy) -> CoreResult<()> {
        match (self, other) {
            (Self::DesiredHealthyPerProvider(p), Self::DesiredHealthyPerProvider(next)) => {
                p.update(next)
            }
        }
    }
}

/// Maintains a desired number of healthy nodes for one provider.
///
/// Every evaluation computes each node's mean health over the trailing
/// `check_interval` window. A node below `healthy_threshold` accrues one
/// strike; `consecutive_checks` strikes in a row trip the node and it is
/// relaunched. A single healthy evaluation clears the strikes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesiredHealthyNodeAmountPerProvider {
    pub id: Id,
    pub min: u32,
    pub max: u32,
    pub desired: u32,
    pub healthy_threshold: f64,
    /// Trailing window, stored negative (e.g. -5 s): the evaluation window
    /// is `(now + check_interval, now)`.
    #[serde(with = "signed_seconds")]
    pub check_interval: TimeDelta,
    pub provider: Provider,
    pub consecutive_checks: u32,
    /// Strikes per node id.
    #[serde(default)]
    pub consecutive_checks_num: BTreeMap<Id, u32>,
    /// Healthy-or-tolerated node count from the latest evaluation.
    #[serde(default)]
    pub current: u32,
}

impl DesiredHealthyNodeAmountPerProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<Id>,
        min: u32,
        max: u32,
        desired: u32,
        consecutive_checks: u32,
        healthy_threshold: f64,
        check_interval: TimeDelta,
        provider: Provider,
    ) -> CoreResult<Self> {
        if desired > max {
            return Err(CoreError::ConstructionInvalid(format!(
                "desired {desired} can not be more than max {max}"
            )));
        }
        if desired < min {
            return Err(CoreError::ConstructionInvalid(format!(
                "desired {desired} can not be less than min {min}"
            )));
        }
        if min > max {
            return Err(CoreError::ConstructionInvalid(format!(
                "min {min} can not be more than max {max}"
            )));
        }
        if consecutive_checks == 0 {
            return Err(CoreError::ConstructionInvalid(
                "consecutive_checks must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            id: id.into(),
            min,
            max,
            desired,
            healthy_threshold,
            check_interval,
            provider,
            consecutive_checks,
            consecutive_checks_num: BTreeMap::new(),
            current: 0,
        })
    }

    pub fn evaluate(&mut self, nodes: &mut NodeSet, plan: &mut CommandPlan) -> CoreResult<()> {
        self.count_current(nodes);

        if self.current == self.desired {
            return Ok(());
        }

        if self.current < self.desired {
            let amt = self.desired - self.current;
            let mut handled = 0u32;

            // Tripped nodes are replaced 1:1, then any remaining shortfall
            // is covered by fresh launches.
            let tripped: Vec<Id> = self
                .consecutive_checks_num
                .iter()
                .filter(|(id, strikes)| {
                    **strikes == self.consecutive_checks && nodes.contains_key(*id)
                })
                .map(|(id, _)| id.clone())
                .collect();

            for node_id in tripped {
                info!(policy = %self.id, node = %node_id, "node tripped, scheduling relaunch");
                append(plan, Command::relaunch(self.provider.clone(), node_id));
                handled += 1;
            }

            for _ in handled..amt {
                info!(policy = %self.id, "capacity below desired, scheduling launch");
                append(plan, Command::launch(self.provider.clone()));
            }
        }

        if self.current > self.desired {
            let amt = self.current - self.desired;
            let victims: Vec<Id> = nodes
                .values()
                .filter(|n| n.provider.id == self.provider.id)
                .take(amt as usize)
                .map(|n| n.id.clone())
                .collect();

            for node_id in victims {
                info!(policy = %self.id, node = %node_id, "capacity above desired, scheduling terminate");
                append(plan, Command::terminate(self.provider.clone(), node_id));
            }
        }

        Ok(())
    }

    /// One counting pass over the node set. Resets `current`, ensures a
    /// strike entry per known node, and applies the hysteresis rules: a
    /// failing node is tolerated (counted present, kept `Active`) until it
    /// accrues `consecutive_checks` strikes in a row.
    fn count_current(&mut self, nodes: &mut NodeSet) {
        self.current = 0;

        // Strikes of nodes that left the group are meaningless; drop them
        // so a departed node can never be selected for relaunch.
        self.consecutive_checks_num
            .retain(|id, _| nodes.contains_key(id));

        for (id, node) in nodes.iter_mut() {
            let strikes = self.consecutive_checks_num.entry(id.clone()).or_insert(0);

            if node.provider.id != self.provider.id {
                continue;
            }

            let now = Utc::now();
            let avg = node.calculate_metric_value(MetricKind::Health, now + self.check_interval, now);

            if avg >= self.healthy_threshold {
                node.state = NodeState::Active;
                self.current += 1;
                *strikes = 0;
                continue;
            }

            *strikes += 1;
            node.state = NodeState::Unhealthy;
            debug!(
                policy = %self.id,
                node = %id,
                avg,
                strikes = *strikes,
                of = self.consecutive_checks,
                "node below healthy threshold"
            );

            if *strikes < self.consecutive_checks {
                // Tolerated: still counts toward capacity so a transient
                // flap does not over-correct.
                self.current += 1;
                node.state = NodeState::Active;
            }
        }
    }

    pub fn update(&mut self, next: DesiredHealthyNodeAmountPerProvider) -> CoreResult<()> {
        self.min = next.min;
        self.max = next.max;
        self.desired = next.desired;
        self.healthy_threshold = next.healthy_threshold;
        self.check_interval = next.check_interval;
        self.provider = next.provider;
        self.consecutive_checks = next.consecutive_checks;
        self.current = 0;
        Ok(())
    }
}

/// Append at order `len + 1`, preserving everything already planned.
fn append(plan: &mut CommandPlan, command: Command) {
    let order = Order::new(plan.len() as u64 + 1);
    plan.insert(order, command);
}
