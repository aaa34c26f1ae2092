//! Cloud collaborator seams
//!
//! The session reads VM state through [`CloudInventory`] and applies plan
//! steps through [`CloudRemediator`]. [`SnapshotCloud`] implements both over a
//! TOML environment snapshot.

pub mod snapshot;

pub use snapshot::{NsgRecord, Snapshot, SnapshotCloud, VmRecord};

use crate::error::Result;
use async_trait::async_trait;
use nsg_eval::{NsgLayer, PowerState, RemediationAction};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// The VM being inspected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    pub resource_group: String,
    pub vm: String,
}

impl VmTarget {
    pub fn new(resource_group: impl Into<String>, vm: impl Into<String>) -> Self {
        Self {
            subscription_id: None,
            resource_group: resource_group.into(),
            vm: vm.into(),
        }
    }

    pub fn with_subscription(mut self, subscription_id: Option<String>) -> Self {
        self.subscription_id = subscription_id;
        self
    }
}

impl fmt::Display for VmTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.vm)
    }
}

/// Addresses of the VM's primary network interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkAddresses {
    pub public_ip: Option<IpAddr>,
    pub private_ip: Option<IpAddr>,
}

impl fmt::Display for NetworkAddresses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |ip: Option<IpAddr>| ip.map_or_else(|| "none".to_string(), |ip| ip.to_string());
        write!(
            f,
            "public {}, private {}",
            show(self.public_ip),
            show(self.private_ip)
        )
    }
}

/// Read access to VM power state, addressing and the security groups guarding it
#[async_trait]
pub trait CloudInventory: Send + Sync {
    async fn power_state(&self, target: &VmTarget) -> Result<PowerState>;

    async fn network_addresses(&self, target: &VmTarget) -> Result<NetworkAddresses>;

    /// Security groups on the path to the VM, subnet first
    async fn network_security_groups(&self, target: &VmTarget) -> Result<Vec<NsgLayer>>;
}

/// Write access for applying remediation steps
///
/// Every operation must be idempotent: applying a change that is already in
/// effect succeeds.
#[async_trait]
pub trait CloudRemediator: Send + Sync {
    async fn start_vm(&self, target: &VmTarget) -> Result<()>;

    async fn apply_rule_action(&self, nsg: &str, action: &RemediationAction) -> Result<()>;
}
