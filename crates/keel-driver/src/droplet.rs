//! Droplet cloud driver — JSON API client for droplet-style providers.

use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use keel_core::{IaasDriver, InstanceStatus, Provider};
use serde_json::Value;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com/v2";

/// Client for a droplet-style provisioning API. Credentials and placement
/// (region, size, image, ssh key) come from the [`Provider`] record on
/// every call, so one driver instance serves any number of accounts.
#[derive(Debug)]
pub struct DropletDriver {
    base_url: String,
    client: reqwest::Client,
}

impl DropletDriver {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url,
            client: crate::build_client(),
        }
    }

    async fn get_droplet(&self, provider: &Provider, instance_id: &str) -> Result<Value> {
        let url = format!("{}/droplets/{}", self.base_url, instance_id);
        let resp: Value = self
            .client
            .get(&url)
            .bearer_auth(&provider.api_key)
            .send()
            .await
            .context("droplet GET request failed")?
            .error_for_status()
            .context("droplet GET returned error status")?
            .json()
            .await
            .context("failed to parse droplet response")?;
        Ok(resp["droplet"].clone())
    }
}

impl Default for DropletDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the first v4 address of the requested visibility out of a droplet
/// payload.
fn extract_ipv4(droplet: &Value, visibility: &str) -> Result<IpAddr> {
    let networks = droplet["networks"]["v4"]
        .as_array()
        .context("droplet payload has no v4 networks")?;

    for network in networks {
        if network["type"].as_str() == Some(visibility) {
            let raw = network["ip_address"]
                .as_str()
                .context("network entry has no ip_address")?;
            return raw
                .parse()
                .with_context(|| format!("invalid {visibility} ip address '{raw}'"));
        }
    }

    bail!("droplet has no {visibility} v4 address")
}

#[async_trait]
impl IaasDriver for DropletDriver {
    fn name(&self) -> &str {
        "droplet"
    }

    async fn create(&self, provider: &Provider, name: &str) -> Result<String> {
        info!(
            provider = %provider.id,
            region = %provider.region,
            size = %provider.size,
            image = %provider.image,
            name,
            "creating droplet"
        );

        let body = serde_json::json!({
            "name": name,
            "region": provider.region,
            "size": provider.size,
            "image": provider.image,
            "private_networking": true,
            "ssh_keys": [provider.ssh_key],
        });

        let resp: Value = self
            .client
            .post(format!("{}/droplets", self.base_url))
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await
            .context("droplet POST request failed")?
            .error_for_status()
            .context("droplet POST returned error status")?
            .json()
            .await
            .context("failed to parse droplet creation response")?;

        let id = resp["droplet"]["id"]
            .as_u64()
            .context("missing droplet.id in creation response")?;

        info!(instance_id = id, name, "droplet created");
        Ok(id.to_string())
    }

    async fn status(&self, provider: &Provider, instance_id: &str) -> Result<InstanceStatus> {
        let droplet = self.get_droplet(provider, instance_id).await?;
        let status = droplet["status"].as_str().unwrap_or("unknown");
        if status == "active" {
            Ok(InstanceStatus::Active)
        } else {
            Ok(InstanceStatus::Pending(status.to_string()))
        }
    }

    async fn destroy(&self, provider: &Provider, instance_id: &str) -> Result<()> {
        info!(instance_id, "destroying droplet");
        let url = format!("{}/droplets/{}", self.base_url, instance_id);
        self.client
            .delete(&url)
            .bearer_auth(&provider.api_key)
            .send()
            .await
            .context("droplet DELETE request failed")?
            .error_for_status()
            .context("droplet DELETE returned error status")?;
        Ok(())
    }

    async fn public_ipv4(&self, provider: &Provider, instance_id: &str) -> Result<IpAddr> {
        let droplet = self.get_droplet(provider, instance_id).await?;
        extract_ipv4(&droplet, "public")
    }

    async fn private_ipv4(&self, provider: &Provider, instance_id: &str) -> Result<IpAddr> {
        let droplet = self.get_droplet(provider, instance_id).await?;
        extract_ipv4(&droplet, "private")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn droplet_payload() -> Value {
        serde_json::json!({
            "id": 4242,
            "status": "active",
            "networks": {
                "v4": [
                    { "ip_address": "10.133.0.7", "type": "private" },
                    { "ip_address": "203.0.113.20", "type": "public" },
                ]
            }
        })
    }

    #[test]
    fn test_extract_ipv4_by_visibility() {
        let droplet = droplet_payload();
        assert_eq!(
            extract_ipv4(&droplet, "public").unwrap(),
            "203.0.113.20".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            extract_ipv4(&droplet, "private").unwrap(),
            "10.133.0.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_extract_ipv4_missing_visibility() {
        let droplet = serde_json::json!({
            "networks": { "v4": [{ "ip_address": "10.0.0.1", "type": "private" }] }
        });
        assert!(extract_ipv4(&droplet, "public").is_err());
    }

    #[test]
    fn test_extract_ipv4_malformed_payload() {
        let droplet = serde_json::json!({ "networks": {} });
        assert!(extract_ipv4(&droplet, "public").is_err());
    }
}
