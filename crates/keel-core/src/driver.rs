//! The IaaS driver seam consumed by provisioning commands.

use std::net::IpAddr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Provider;

/// Instance readiness as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Ready to serve.
    Active,
    /// Any pre-active transitional state, carrying the provider's label.
    Pending(String),
}

/// Provisioning and destruction operations against one cloud.
///
/// Implementations live outside the domain crate; commands only ever see
/// this trait. The `provider` record carries credentials and placement
/// (region, size, image, ssh key) per call.
#[async_trait]
pub trait IaasDriver: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Create an instance, returning the provider-assigned instance id.
    async fn create(&self, provider: &Provider, name: &str) -> Result<String>;

    async fn status(&self, provider: &Provider, instance_id: &str) -> Result<InstanceStatus>;

    async fn destroy(&self, provider: &Provider, instance_id: &str) -> Result<()>;

    async fn public_ipv4(&self, provider: &Provider, instance_id: &str) -> Result<IpAddr>;

    async fn private_ipv4(&self, provider: &Provider, instance_id: &str) -> Result<IpAddr>;
}
