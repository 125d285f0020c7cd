//! The auto-scaling group aggregate: nodes, policies, command plan, and
//! the per-group control loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::CommandPlan;
use crate::driver::IaasDriver;
use crate::error::{CoreError, CoreResult};
use crate::metrics::MetricSeries;
use crate::node::{Node, NodeSet};
use crate::policy::ScalingPolicy;
use crate::types::{AsgState, Id};

/// One iteration of the control loop every 5 s.
pub const TICK: Duration = Duration::from_secs(5);

/// Aggregate root. All public mutators serialize through the group's own
/// lock, and the lock is never held across an await: `execute` drains the
/// plan under the lock and performs driver I/O unlocked, with the
/// `Executing` state guarding against concurrent evaluation.
#[derive(Debug)]
pub struct AutoScalingGroup {
    id: Id,
    inner: Mutex<AsgInner>,
    stop: AtomicBool,
}

#[derive(Debug, Default)]
struct AsgInner {
    state: AsgState,
    nodes: NodeSet,
    policies: BTreeMap<Id, ScalingPolicy>,
    commands: CommandPlan,
}

/// Read-only view of a group for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsgSnapshot {
    pub id: Id,
    pub state: AsgState,
    pub nodes: Vec<Node>,
    pub policies: Vec<ScalingPolicy>,
    pub pending_commands: usize,
}

impl AutoScalingGroup {
    /// A fresh group in state `New`. Nothing but [`setup`] is permitted
    /// until it runs.
    ///
    /// [`setup`]: AutoScalingGroup::setup
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            inner: Mutex::new(AsgInner::default()),
            stop: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn state(&self) -> AsgState {
        self.inner.lock().state
    }

    /// Install the initial node set and policies; `New → Active`.
    pub fn setup(
        &self,
        nodes: NodeSet,
        policies: impl IntoIterator<Item = ScalingPolicy>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == AsgState::Deleted {
            return Err(CoreError::Deleted(self.id.clone()));
        }
        inner.state = AsgState::Active;
        inner.nodes = nodes;
        inner.policies = policies
            .into_iter()
            .map(|p| (p.id().clone(), p))
            .collect();
        inner.commands = CommandPlan::new();
        Ok(())
    }

    fn guard(&self, inner: &AsgInner) -> CoreResult<()> {
        match inner.state {
            AsgState::New => Err(CoreError::NotSetUp(self.id.clone())),
            AsgState::Deleted => Err(CoreError::Deleted(self.id.clone())),
            AsgState::Active | AsgState::Executing => Ok(()),
        }
    }

    /// Route a metric batch to one node's window.
    pub fn add_metrics(&self, node_id: &Id, batch: MetricSeries) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        let node = inner
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoreError::UnknownId(node_id.clone()))?;
        node.add_metrics(batch);
        Ok(())
    }

    pub fn add_node(&self, node: Node) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if inner.nodes.contains_key(&node.id) {
            return Err(CoreError::AlreadyExists(node.id.clone()));
        }
        inner.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn remove_node(&self, node_id: &Id) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        let mut node = inner
            .nodes
            .remove(node_id)
            .ok_or_else(|| CoreError::UnknownId(node_id.clone()))?;
        node.remove();
        Ok(())
    }

    /// Replace the policy with the same id, or install it if unknown.
    pub fn change_policy(&self, policy: ScalingPolicy) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        let id = policy.id().clone();
        match inner.policies.get_mut(&id) {
            Some(existing) => existing.update(policy)?,
            None => {
                inner.policies.insert(id, policy);
            }
        }
        Ok(())
    }

    /// Run every policy against the current node set. Policies only ever
    /// append to the command plan.
    pub fn evaluate(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        self.guard(&inner)?;
        if inner.state == AsgState::Executing {
            return Err(CoreError::Busy(self.id.clone()));
        }

        let mut policies = std::mem::take(&mut inner.policies);
        let mut result = Ok(());
        {
            let AsgInner {
                nodes, commands, ..
            } = &mut *inner;
            for policy in policies.values_mut() {
                if let Err(e) = policy.evaluate(nodes, commands) {
                    result = Err(e);
                    break;
                }
            }
        }
        inner.policies = policies;
        result
    }

    /// Execute the plan in ascending order. Each command is atomic with
    /// respect to its peers: failures are collected, never abort the
    /// pass, and every entry leaves the plan regardless of outcome. On
    /// return the plan is empty and the state is back to `Active`.
    pub async fn execute(&self, driver: &dyn IaasDriver) -> CoreResult<()> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            self.guard(&inner)?;
            if inner.state == AsgState::Executing {
                return Err(CoreError::Busy(self.id.clone()));
            }
            inner.state = AsgState::Executing;
            std::mem::take(&mut inner.commands).into_iter().collect()
        };

        let mut failures = Vec::new();
        for (order, mut command) in drained {
            info!(asg = %self.id, order = order.get(), "executing command");
            if let Err(e) = command.execute(self, driver).await {
                warn!(asg = %self.id, order = order.get(), error = %e, "command failed");
                failures.push(e.to_string());
            }
        }

        let mut inner = self.inner.lock();
        if inner.state == AsgState::Executing {
            inner.state = AsgState::Active;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ExecutionFailed(failures))
        }
    }

    /// Signal the control loop to exit at its next tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Stop the loop and tombstone the group.
    pub fn remove(&self) {
        self.stop();
        self.inner.lock().state = AsgState::Deleted;
    }

    pub fn snapshot(&self) -> AsgSnapshot {
        let inner = self.inner.lock();
        AsgSnapshot {
            id: self.id.clone(),
            state: inner.state,
            nodes: inner.nodes.values().cloned().collect(),
            policies: inner.policies.values().cloned().collect(),
            pending_commands: inner.commands.len(),
        }
    }

    pub fn nodes_snapshot(&self) -> Vec<Node> {
        self.inner.lock().nodes.values().cloned().collect()
    }

    pub fn pending_commands(&self) -> usize {
        self.inner.lock().commands.len()
    }

    /// The cooperative control loop: evaluate, execute, sleep one tick.
    /// Errors are surfaced and tolerated; only the stop signal ends the
    /// loop, and it is observed between ticks only.
    pub async fn run(&self, driver: &dyn IaasDriver) {
        info!(asg = %self.id, "control loop started");
        loop {
            if self.stopped() {
                break;
            }

            if let Err(e) = self.evaluate() {
                warn!(asg = %self.id, error = %e, "evaluation failed");
            }
            if let Err(e) = self.execute(driver).await {
                warn!(asg = %self.id, error = %e, "execution failed");
            }

            tokio::time::sleep(TICK).await;
        }
        info!(asg = %self.id, "control loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};

    use crate::driver::InstanceStatus;
    use crate::metrics::Metric;
    use crate::node::node_set;
    use crate::policy::DesiredHealthyNodeAmountPerProvider;
    use crate::types::{NetworkInterface, Provider};

    use super::*;

    #[derive(Debug, Default)]
    struct FakeDriver {
        created: AtomicU32,
        destroyed: Mutex<Vec<String>>,
        gate: Option<Arc<tokio::sync::Notify>>,
    }

    #[async_trait]
    impl IaasDriver for FakeDriver {
        fn name(&self) -> &str {
            "fake"
        }

        async fn create(&self, _provider: &Provider, _name: &str) -> anyhow::Result<String> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("fake-{n}"))
        }

        async fn status(
            &self,
            _provider: &Provider,
            _instance_id: &str,
        ) -> anyhow::Result<InstanceStatus> {
            Ok(InstanceStatus::Active)
        }

        async fn destroy(&self, _provider: &Provider, instance_id: &str) -> anyhow::Result<()> {
            self.destroyed.lock().push(instance_id.to_string());
            Ok(())
        }

        async fn public_ipv4(
            &self,
            _provider: &Provider,
            _instance_id: &str,
        ) -> anyhow::Result<IpAddr> {
            Ok("10.0.0.2".parse().unwrap())
        }

        async fn private_ipv4(
            &self,
            _provider: &Provider,
            _instance_id: &str,
        ) -> anyhow::Result<IpAddr> {
            Ok("10.0.0.1".parse().unwrap())
        }
    }

    fn provider() -> Provider {
        Provider {
            id: "digitalocean".to_string(),
            api_key: "some-key".to_string(),
            ..Provider::default()
        }
    }

    fn healthy_node(id: &str) -> Node {
        let mut node = Node::setup(
            id,
            provider(),
            NetworkInterface::new("eth0", "192.100.10.1".parse::<IpAddr>().unwrap()),
            NetworkInterface::new("eth0", "192.100.10.2".parse::<IpAddr>().unwrap()),
        );
        let now = Utc::now();
        node.add_metrics(MetricSeries::from_samples((0..5).map(|i| {
            Metric::health(
                1.0,
                now - TimeDelta::milliseconds(400) - TimeDelta::seconds(i),
            )
        })));
        node
    }

    fn scaling_policy(desired: u32, max: u32) -> ScalingPolicy {
        ScalingPolicy::DesiredHealthyPerProvider(
            DesiredHealthyNodeAmountPerProvider::new(
                "policy-1",
                1,
                max,
                desired,
                3,
                0.7,
                TimeDelta::seconds(-5),
                provider(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_mutators_refused_before_setup() {
        let asg = AutoScalingGroup::new("asg-1");
        assert!(matches!(
            asg.add_node(healthy_node("node1")),
            Err(CoreError::NotSetUp(_))
        ));
        assert!(matches!(
            asg.add_metrics(&Id::new("node1"), MetricSeries::new()),
            Err(CoreError::NotSetUp(_))
        ));
        assert!(matches!(asg.evaluate(), Err(CoreError::NotSetUp(_))));
    }

    #[test]
    fn test_setup_activates() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(node_set([healthy_node("node1")]), [scaling_policy(1, 1)])
            .unwrap();
        assert_eq!(asg.state(), AsgState::Active);
        assert_eq!(asg.nodes_snapshot().len(), 1);
    }

    #[test]
    fn test_mutators_refused_after_remove() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(NodeSet::new(), []).unwrap();
        asg.remove();
        assert_eq!(asg.state(), AsgState::Deleted);
        assert!(asg.stopped());
        assert!(matches!(
            asg.add_node(healthy_node("node1")),
            Err(CoreError::Deleted(_))
        ));
        assert!(matches!(
            asg.setup(NodeSet::new(), []),
            Err(CoreError::Deleted(_))
        ));
    }

    #[test]
    fn test_add_node_rejects_duplicate_id() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(node_set([healthy_node("node1")]), []).unwrap();
        assert!(matches!(
            asg.add_node(healthy_node("node1")),
            Err(CoreError::AlreadyExists(_))
        ));
        asg.add_node(healthy_node("node2")).unwrap();
        assert_eq!(asg.nodes_snapshot().len(), 2);
    }

    #[test]
    fn test_add_metrics_unknown_node() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(NodeSet::new(), []).unwrap();
        assert!(matches!(
            asg.add_metrics(&Id::new("ghost"), MetricSeries::new()),
            Err(CoreError::UnknownId(_))
        ));
    }

    #[test]
    fn test_remove_node_unknown_id() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(NodeSet::new(), []).unwrap();
        assert!(matches!(
            asg.remove_node(&Id::new("ghost")),
            Err(CoreError::UnknownId(_))
        ));
    }

    #[test]
    fn test_evaluate_is_append_only() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(node_set([healthy_node("node1")]), [scaling_policy(2, 2)])
            .unwrap();

        asg.evaluate().unwrap();
        let after_first = asg.pending_commands();
        assert_eq!(after_first, 1);

        asg.evaluate().unwrap();
        assert!(asg.pending_commands() >= after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_empty_plan_returns_to_active() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(node_set([healthy_node("node1")]), []).unwrap();

        let driver = FakeDriver::default();
        asg.execute(&driver).await.unwrap();
        assert_eq!(asg.state(), AsgState::Active);
        assert_eq!(asg.pending_commands(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_launches_planned_node() {
        let asg = AutoScalingGroup::new("asg-1");
        asg.setup(node_set([healthy_node("node1")]), [scaling_policy(2, 2)])
            .unwrap();

        asg.evaluate().unwrap();
        assert_eq!(asg.pending_commands(), 1);

        let driver = FakeDriver::default();
        asg.execute(&driver).await.unwrap();

        assert_eq!(asg.pending_commands(), 0);
        assert_eq!(asg.state(), AsgState::Active);
        assert_eq!(asg.nodes_snapshot().len(), 2);
        assert_eq!(driver.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evaluate_rejected_while_executing() {
        let asg = Arc::new(AutoScalingGroup::new("asg-1"));
        asg.setup(node_set([healthy_node("node1")]), [scaling_policy(2, 2)])
            .unwrap();
        asg.evaluate().unwrap();

        let gate = Arc::new(tokio::sync::Notify::new());
        let driver = Arc::new(FakeDriver {
            gate: Some(gate.clone()),
            ..FakeDriver::default()
        });

        let exec_asg = asg.clone();
        let exec_driver = driver.clone();
        let handle =
            tokio::spawn(async move { exec_asg.execute(exec_driver.as_ref()).await });

        // Let the executor reach the gated driver call.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(asg.state(), AsgState::Executing);
        assert!(matches!(asg.evaluate(), Err(CoreError::Busy(_))));

        handle.abort();
    }
}
