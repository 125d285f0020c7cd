//! Wire types for the HTTP API and their conversion into domain objects.

use chrono::{DateTime, TimeDelta, Utc};
use keel_core::{
    DesiredHealthyNodeAmountPerProvider, CoreError, CoreResult, Id, Metric, MetricSeries,
    NetworkInterface, Node, Provider, ScalingPolicy,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterfaceDto {
    #[serde(default)]
    pub id: String,
    pub ip: String,
}

impl NetworkInterfaceDto {
    fn into_domain(self) -> CoreResult<NetworkInterface> {
        let ip = self.ip.parse().map_err(|_| {
            CoreError::ConstructionInvalid(format!("invalid ip address '{}'", self.ip))
        })?;
        Ok(NetworkInterface::new(self.id.as_str(), ip))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: String,
    pub provider: Provider,
    pub private_iface: NetworkInterfaceDto,
    pub public_iface: NetworkInterfaceDto,
}

impl NodeDto {
    pub fn into_domain(self) -> CoreResult<Node> {
        Ok(Node::setup(
            self.id.as_str(),
            self.provider,
            self.private_iface.into_domain()?,
            self.public_iface.into_domain()?,
        ))
    }
}

/// The one policy shape the API accepts. `check_interval` is negative
/// whole seconds (the trailing evaluation window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthPolicyDto {
    pub id: String,
    pub min: u32,
    pub max: u32,
    pub desired: u32,
    pub healthy_threshold: f64,
    pub check_interval: i64,
    pub provider: Provider,
    pub consecutive_checks: u32,
}

impl HealthPolicyDto {
    pub fn into_domain(self) -> CoreResult<ScalingPolicy> {
        let check_interval = TimeDelta::try_seconds(self.check_interval).ok_or_else(|| {
            CoreError::ConstructionInvalid(format!(
                "check_interval out of range: {}s",
                self.check_interval
            ))
        })?;
        Ok(ScalingPolicy::DesiredHealthyPerProvider(
            DesiredHealthyNodeAmountPerProvider::new(
                self.id.as_str(),
                self.min,
                self.max,
                self.desired,
                self.consecutive_checks,
                self.healthy_threshold,
                check_interval,
                self.provider,
            )?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetupAsgRequest {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub health_policy: Option<HealthPolicyDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveAsgRequest {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsgQuery {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDto {
    pub value: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMetricsRequest {
    pub id: String,
    pub node_id: String,
    pub metrics: Vec<MetricDto>,
}

impl AddMetricsRequest {
    pub fn series(&self) -> MetricSeries {
        MetricSeries::from_samples(
            self.metrics
                .iter()
                .map(|m| Metric::health(m.value, m.time)),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePolicyRequest {
    pub id: String,
    pub health_policy: HealthPolicyDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddNodeRequest {
    pub id: String,
    pub node: NodeDto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveNodeRequest {
    pub id: String,
    pub node_id: String,
}

pub fn asg_id(raw: &str) -> Id {
    Id::new(raw)
}

#[cfg(test)]
mod tests {
    use keel_core::NodeState;

    use super::*;

    #[test]
    fn test_node_dto_into_domain() {
        let dto = NodeDto {
            id: "node1".to_string(),
            provider: Provider {
                id: "digitalocean".to_string(),
                ..Provider::default()
            },
            private_iface: NetworkInterfaceDto {
                id: "eth0".to_string(),
                ip: "10.0.0.5".to_string(),
            },
            public_iface: NetworkInterfaceDto {
                id: "eth0".to_string(),
                ip: "203.0.113.5".to_string(),
            },
        };

        let node = dto.into_domain().unwrap();
        assert_eq!(node.id, Id::new("node1"));
        assert_eq!(node.state, NodeState::Unhealthy);
    }

    #[test]
    fn test_node_dto_rejects_bad_ip() {
        let dto = NodeDto {
            id: "node1".to_string(),
            provider: Provider::default(),
            private_iface: NetworkInterfaceDto {
                id: "eth0".to_string(),
                ip: "not-an-ip".to_string(),
            },
            public_iface: NetworkInterfaceDto {
                id: "eth0".to_string(),
                ip: "203.0.113.5".to_string(),
            },
        };
        assert!(dto.into_domain().is_err());
    }

    #[test]
    fn test_policy_dto_validates_bounds() {
        let dto = HealthPolicyDto {
            id: "policy-1".to_string(),
            min: 1,
            max: 1,
            desired: 3,
            healthy_threshold: 0.7,
            check_interval: -5,
            provider: Provider::default(),
            consecutive_checks: 3,
        };
        assert!(dto.into_domain().is_err());
    }

    #[test]
    fn test_metrics_request_builds_series() {
        let now = Utc::now();
        let req = AddMetricsRequest {
            id: "asg-1".to_string(),
            node_id: "node1".to_string(),
            metrics: vec![
                MetricDto {
                    value: 1.0,
                    time: now,
                },
                MetricDto {
                    value: 0.0,
                    time: now - TimeDelta::seconds(1),
                },
            ],
        };
        assert_eq!(req.series().len(), 2);
    }
}
