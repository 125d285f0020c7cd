//! Shared identifiers, provider records, and state enums.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque string identifier. Unique within its scope: ASG ids globally,
/// node and policy ids within their ASG.
///
/// `Id` is `Ord`, and every id-keyed collection in this crate is a
/// `BTreeMap`, so iteration order (and with it node selection for
/// terminate/relaunch) is lexicographic and deterministic.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Cloud provider parameters. Immutable once attached to a node or policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub ssh_key: String,
}

/// Well-known provider ids.
pub const PROVIDER_LOCAL: &str = "local";
pub const PROVIDER_DIGITALOCEAN: &str = "digitalocean";
pub const PROVIDER_LINODE: &str = "linode";
pub const PROVIDER_VULTR: &str = "vultr";

/// A network interface bound to a node. Every node carries exactly two:
/// private and public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: Id,
    pub ip: IpAddr,
}

impl NetworkInterface {
    pub fn new(id: impl Into<Id>, ip: IpAddr) -> Self {
        Self { id: id.into(), ip }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    New,
    Active,
    Unhealthy,
    Terminated,
    Deleted,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Active => write!(f, "active"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Terminated => write!(f, "terminated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AsgState {
    #[default]
    New,
    Active,
    Executing,
    Deleted,
}

impl std::fmt::Display for AsgState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Active => write!(f, "active"),
            Self::Executing => write!(f, "executing"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[default]
    New,
    InProgress,
    Done,
    Failed,
}

/// Serde adapter for signed [`chrono::TimeDelta`] fields expressed as whole
/// seconds on the wire: `keep_metric_for` and `check_interval`, both
/// negative age cutoffs.
pub mod signed_seconds {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_i64(delta.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<TimeDelta, D::Error> {
        let secs = i64::deserialize(de)?;
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}s")))
    }
}

/// Serde adapter for unsigned `std::time::Duration` fields expressed as
/// whole seconds on the wire (command timeouts).
pub mod duration_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dur: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(dur.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ordering_is_lexicographic() {
        let mut ids = vec![Id::new("node3"), Id::new("node1"), Id::new("node2")];
        ids.sort();
        assert_eq!(
            ids,
            vec![Id::new("node1"), Id::new("node2"), Id::new("node3")]
        );
    }

    #[test]
    fn test_state_serde_names() {
        assert_eq!(
            serde_json::to_string(&NodeState::Unhealthy).unwrap(),
            r#""unhealthy""#
        );
        assert_eq!(
            serde_json::to_string(&AsgState::Executing).unwrap(),
            r#""executing""#
        );
        assert_eq!(
            serde_json::to_string(&CommandState::InProgress).unwrap(),
            r#""in_progress""#
        );
    }
}
