//! Deterministic in-memory driver for local runs and tests.

use std::collections::BTreeMap;
use std::net::IpAddr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use keel_core::{IaasDriver, InstanceStatus, Provider};
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Clone)]
struct LocalInstance {
    public_ip: IpAddr,
    private_ip: IpAddr,
    /// Remaining status polls that report a pending state.
    pending_polls: u32,
}

/// In-memory stand-in for a cloud API. Instances become `active` after a
/// configurable number of status polls and get addresses from the
/// 10.0.0.0/24 (private) and 203.0.113.0/24 (public) test ranges.
#[derive(Debug, Default)]
pub struct LocalDriver {
    state: Mutex<LocalState>,
    /// Status polls each new instance answers with `new` before `active`.
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct LocalState {
    next_seq: u32,
    instances: BTreeMap<String, LocalInstance>,
    destroyed: Vec<String>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose instances report a pending status for the first
    /// `polls` status calls, to exercise the provisioning wait loop.
    pub fn with_pending_polls(polls: u32) -> Self {
        Self {
            state: Mutex::new(LocalState::default()),
            pending_polls: polls,
        }
    }

    /// Adopt an instance that exists outside the driver, so status and
    /// destroy calls against it succeed (pre-registered fleet nodes).
    pub fn seed(&self, instance_id: &str) {
        let mut state = self.state.lock();
        // Seeded instances take addresses from the top of the ranges so
        // they never collide with created ones, and `created_count` only
        // ever reflects driver-made instances.
        let octet = 254 - u8::try_from(state.instances.len() % 100).unwrap_or(0);
        state.instances.insert(
            instance_id.to_string(),
            LocalInstance {
                public_ip: IpAddr::from([203, 0, 113, octet]),
                private_ip: IpAddr::from([10, 0, 0, octet]),
                pending_polls: 0,
            },
        );
    }

    /// Ids of instances destroyed so far, in destruction order.
    pub fn destroyed(&self) -> Vec<String> {
        self.state.lock().destroyed.clone()
    }

    /// Number of instances created so far, including destroyed ones.
    pub fn created_count(&self) -> u32 {
        self.state.lock().next_seq
    }

    /// Ids of instances currently alive.
    pub fn alive(&self) -> Vec<String> {
        self.state.lock().instances.keys().cloned().collect()
    }
}

#[async_trait]
impl IaasDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, _provider: &Provider, name: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let seq = state.next_seq;
        let instance_id = format!("local-{seq}");

        let octet = u8::try_from(seq % 250).unwrap_or(1) + 1;
        let instance = LocalInstance {
            public_ip: IpAddr::from([203, 0, 113, octet]),
            private_ip: IpAddr::from([10, 0, 0, octet]),
            pending_polls: self.pending_polls,
        };
        state.instances.insert(instance_id.clone(), instance);

        info!(instance_id, name, "local instance created");
        Ok(instance_id)
    }

    async fn status(&self, _provider: &Provider, instance_id: &str) -> Result<InstanceStatus> {
        let mut state = self.state.lock();
        let Some(instance) = state.instances.get_mut(instance_id) else {
            bail!("unknown local instance '{instance_id}'");
        };
        if instance.pending_polls > 0 {
            instance.pending_polls -= 1;
            return Ok(InstanceStatus::Pending("new".to_string()));
        }
        Ok(InstanceStatus::Active)
    }

    async fn destroy(&self, _provider: &Provider, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.instances.remove(instance_id).is_none() {
            bail!("unknown local instance '{instance_id}'");
        }
        state.destroyed.push(instance_id.to_string());
        info!(instance_id, "local instance destroyed");
        Ok(())
    }

    async fn public_ipv4(&self, _provider: &Provider, instance_id: &str) -> Result<IpAddr> {
        let state = self.state.lock();
        match state.instances.get(instance_id) {
            Some(instance) => Ok(instance.public_ip),
            None => bail!("unknown local instance '{instance_id}'"),
        }
    }

    async fn private_ipv4(&self, _provider: &Provider, instance_id: &str) -> Result<IpAddr> {
        let state = self.state.lock();
        match state.instances.get(instance_id) {
            Some(instance) => Ok(instance.private_ip),
            None => bail!("unknown local instance '{instance_id}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Provider {
        Provider {
            id: "local".to_string(),
            ..Provider::default()
        }
    }

    #[tokio::test]
    async fn test_create_status_destroy_cycle() {
        let driver = LocalDriver::new();
        let p = provider();

        let id = driver.create(&p, "auto-test").await.unwrap();
        assert_eq!(id, "local-1");
        assert_eq!(driver.status(&p, &id).await.unwrap(), InstanceStatus::Active);

        let public = driver.public_ipv4(&p, &id).await.unwrap();
        let private = driver.private_ipv4(&p, &id).await.unwrap();
        assert_ne!(public, private);

        driver.destroy(&p, &id).await.unwrap();
        assert_eq!(driver.destroyed(), vec!["local-1".to_string()]);
        assert!(driver.alive().is_empty());
        assert!(driver.status(&p, &id).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_polls_before_active() {
        let driver = LocalDriver::with_pending_polls(2);
        let p = provider();
        let id = driver.create(&p, "auto-test").await.unwrap();

        assert!(matches!(
            driver.status(&p, &id).await.unwrap(),
            InstanceStatus::Pending(_)
        ));
        assert!(matches!(
            driver.status(&p, &id).await.unwrap(),
            InstanceStatus::Pending(_)
        ));
        assert_eq!(driver.status(&p, &id).await.unwrap(), InstanceStatus::Active);
    }

    #[tokio::test]
    async fn test_destroy_unknown_instance_errors() {
        let driver = LocalDriver::new();
        assert!(driver.destroy(&provider(), "ghost").await.is_err());
    }
}
