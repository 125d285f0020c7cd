//! Keel autoscaling domain model.
//!
//! An [`AutoScalingGroup`] owns a set of nodes, a set of scaling policies,
//! and an ordered command plan. Policies read rolling health-metric windows
//! and append provisioning commands; the ASG executes the plan against an
//! [`IaasDriver`]. A [`Supervisor`] runs many ASG control loops concurrently.

#![forbid(unsafe_code)]

pub mod asg;
pub mod command;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod node;
pub mod policy;
pub mod supervisor;
pub mod types;

pub use asg::{AsgSnapshot, AutoScalingGroup, TICK};
pub use command::{
    BaseCommand, Command, CommandKind, CommandPlan, Order, DEFAULT_COMMAND_TIMEOUT,
    POLL_INTERVAL, SETTLE,
};
pub use driver::{IaasDriver, InstanceStatus};
pub use error::{CoreError, CoreResult};
pub use metrics::{Metric, MetricKind, MetricSeries};
pub use node::{node_set, Node, NodeSet};
pub use policy::{DesiredHealthyNodeAmountPerProvider, ScalingPolicy};
pub use supervisor::Supervisor;
pub use types::{AsgState, CommandState, Id, NetworkInterface, NodeState, Provider};
