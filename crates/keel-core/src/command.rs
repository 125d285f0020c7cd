//! Provisioning commands and the ordered command plan.
//!
//! Commands are plain data: they never hold their owning group. `execute`
//! receives the group and the IaaS driver by reference, which keeps the
//! ASG ↔ command relationship acyclic and the plan serializable.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::asg::AutoScalingGroup;
use crate::driver::{IaasDriver, InstanceStatus};
use crate::error::{CoreError, CoreResult};
use crate::node::Node;
use crate::types::{duration_seconds, CommandState, Id, NetworkInterface, Provider};

/// Interval between driver status polls while waiting for `active`.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Grace period after a node is provisioned and registered, before the
/// command completes, so first health samples can arrive.
pub const SETTLE: Duration = Duration::from_secs(3);

/// Default per-command driver timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Position of a command in its plan. Monotonic, positive, ascending
/// iteration is execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Order(u64);

impl Order {
    pub fn new(order: u64) -> Self {
        Self(order)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Pending commands keyed by order.
pub type CommandPlan = BTreeMap<Order, Command>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    pub provider: Provider,
    pub state: CommandState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_seconds")]
    pub timeout: Duration,
}

impl BaseCommand {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: CommandState::New,
            error: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommandKind {
    /// Provision one fresh node.
    Launch,
    /// Destroy the identified node.
    Terminate { node_id: Id },
    /// Provision a replacement, then destroy the identified node.
    /// Replacement strictly precedes removal.
    Relaunch { node_id: Id },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(flatten)]
    pub base: BaseCommand,
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl Command {
    pub fn launch(provider: Provider) -> Self {
        Self {
            base: BaseCommand::new(provider),
            kind: CommandKind::Launch,
        }
    }

    pub fn terminate(provider: Provider, node_id: impl Into<Id>) -> Self {
        Self {
            base: BaseCommand::new(provider),
            kind: CommandKind::Terminate {
                node_id: node_id.into(),
            },
        }
    }

    pub fn relaunch(provider: Provider, node_id: impl Into<Id>) -> Self {
        Self {
            base: BaseCommand::new(provider),
            kind: CommandKind::Relaunch {
                node_id: node_id.into(),
            },
        }
    }

    /// Run this command against the driver, mutating the group's node set.
    /// Atomic with respect to its peers: the caller collects the error and
    /// carries on with the rest of the plan.
    pub async fn execute(
        &mut self,
        asg: &AutoScalingGroup,
        driver: &dyn IaasDriver,
    ) -> CoreResult<()> {
        self.base.state = CommandState::InProgress;

        let result = match self.kind.clone() {
            CommandKind::Launch => launch_node(&self.base, asg, driver).await.map(|_| ()),
            CommandKind::Terminate { node_id } => {
                terminate_node(&self.base, asg, driver, &node_id).await
            }
            CommandKind::Relaunch { node_id } => {
                match launch_node(&self.base, asg, driver).await {
                    Ok(_) => terminate_node(&self.base, asg, driver, &node_id).await,
                    Err(e) => Err(e),
                }
            }
        };

        match &result {
            Ok(()) => self.base.state = CommandState::Done,
            Err(e) => {
                self.base.state = CommandState::Failed;
                self.base.error = Some(e.to_string());
            }
        }

        result
    }
}

/// Create an instance, wait until the driver reports it active, resolve
/// its addresses, and register the node with the group.
async fn launch_node(
    base: &BaseCommand,
    asg: &AutoScalingGroup,
    driver: &dyn IaasDriver,
) -> CoreResult<Id> {
    let name = format!("auto-{}", Uuid::new_v4().simple());
    info!(asg = %asg.id(), provider = %base.provider.id, name, "launching node");

    let provision = async {
        let instance_id = driver.create(&base.provider, &name).await?;

        loop {
            match driver.status(&base.provider, &instance_id).await? {
                InstanceStatus::Active => break,
                InstanceStatus::Pending(status) => {
                    debug!(asg = %asg.id(), instance = %instance_id, status, "waiting for instance");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }

        let public_ip = driver.public_ipv4(&base.provider, &instance_id).await?;
        let private_ip = driver.private_ipv4(&base.provider, &instance_id).await?;
        anyhow::Ok((instance_id, public_ip, private_ip))
    };

    let (instance_id, public_ip, private_ip) = tokio::time::timeout(base.timeout, provision)
        .await
        .map_err(|_| {
            CoreError::ProvisioningFailed(format!(
                "timed out after {:?} waiting for instance to become active",
                base.timeout
            ))
        })?
        .map_err(|e| CoreError::ProvisioningFailed(e.to_string()))?;

    let node_id = Id::from(instance_id);
    let node = Node::setup(
        node_id.clone(),
        base.provider.clone(),
        NetworkInterface::new("eth0", private_ip),
        NetworkInterface::new("eth0", public_ip),
    );
    asg.add_node(node)?;

    info!(asg = %asg.id(), node = %node_id, %public_ip, %private_ip, "node registered");

    // Let the first health samples arrive before the command completes.
    tokio::time::sleep(SETTLE).await;

    Ok(node_id)
}

/// Destroy the instance and drop the node from the group. Local removal is
/// attempted even when the driver call fails.
async fn terminate_node(
    base: &BaseCommand,
    asg: &AutoScalingGroup,
    driver: &dyn IaasDriver,
    node_id: &Id,
) -> CoreResult<()> {
    info!(asg = %asg.id(), node = %node_id, "terminating node");

    let destroyed = tokio::time::timeout(
        base.timeout,
        driver.destroy(&base.provider, node_id.as_str()),
    )
    .await;

    if let Err(e) = asg.remove_node(node_id) {
        warn!(asg = %asg.id(), node = %node_id, error = %e, "node missing during terminate");
    }

    match destroyed {
        Err(_) => Err(CoreError::TerminationFailed(format!(
            "timed out after {:?} destroying node {node_id}",
            base.timeout
        ))),
        Ok(Err(e)) => Err(CoreError::TerminationFailed(e.to_string())),
        Ok(Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_sort_ascending() {
        let mut plan = CommandPlan::new();
        let provider = Provider::default();
        plan.insert(Order::new(3), Command::launch(provider.clone()));
        plan.insert(Order::new(1), Command::terminate(provider.clone(), "a"));
        plan.insert(Order::new(2), Command::relaunch(provider, "b"));

        let orders: Vec<u64> = plan.keys().map(|o| o.get()).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_new_command_defaults() {
        let cmd = Command::launch(Provider::default());
        assert_eq!(cmd.base.state, CommandState::New);
        assert!(cmd.base.error.is_none());
        assert_eq!(cmd.base.timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_command_serializes_with_action_tag() {
        let cmd = Command::relaunch(Provider::default(), "node1");
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["action"], "relaunch");
        assert_eq!(json["node_id"], "node1");
        assert_eq!(json["state"], "new");
    }
}
