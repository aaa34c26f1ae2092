//! Environment snapshot backend
//!
//! A snapshot is a TOML document describing VMs and security groups:
//!
//! ```toml
//! [vms.web-01]
//! resource_group = "rdp-test-rg"
//! power_state = "PowerState/deallocated"
//! nic_nsg = "web-01-nsg"
//! public_ip = "203.0.113.10"
//! private_ip = "10.0.0.4"
//!
//! [[nsgs.web-01-nsg.security_rules]]
//! name = "DenyRDP"
//! priority = 1000
//! direction = "Inbound"
//! access = "Deny"
//! protocol = "Tcp"
//! destination_port_range = "3389"
//! ```
//!
//! The file is re-read on every call and rewritten after every applied
//! action, so each read sees the current state.

use super::{CloudInventory, CloudRemediator, NetworkAddresses, VmTarget};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use nsg_eval::{NsgLayer, NsgScope, PowerState, RemediationAction, RuleSet, SecurityRule};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub vms: IndexMap<String, VmRecord>,
    #[serde(default)]
    pub nsgs: IndexMap<String, NsgRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VmRecord {
    pub resource_group: String,
    pub power_state: PowerState,
    /// Security group attached to the VM's network interface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nic_nsg: Option<String>,
    /// Security group attached to the VM's subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_nsg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<IpAddr>,
}

impl VmRecord {
    pub fn addresses(&self) -> NetworkAddresses {
        NetworkAddresses {
            public_ip: self.public_ip,
            private_ip: self.private_ip,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NsgRecord {
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
}

impl Snapshot {
    /// Look up a VM; resource group names compare case-insensitively
    pub fn vm(&self, target: &VmTarget) -> Result<&VmRecord> {
        self.vms
            .get(&target.vm)
            .filter(|vm| vm.resource_group.eq_ignore_ascii_case(&target.resource_group))
            .ok_or_else(|| vm_not_found(target))
    }

    fn vm_mut(&mut self, target: &VmTarget) -> Result<&mut VmRecord> {
        self.vms
            .get_mut(&target.vm)
            .filter(|vm| vm.resource_group.eq_ignore_ascii_case(&target.resource_group))
            .ok_or_else(|| vm_not_found(target))
    }

    pub fn rule_set(&self, nsg: &str) -> Result<RuleSet> {
        self.nsgs
            .get(nsg)
            .map(|record| RuleSet::new(nsg, record.security_rules.clone()))
            .ok_or_else(|| AppError::NsgNotFound(nsg.to_string()))
    }

    /// Security groups guarding `target`, subnet first
    pub fn layers(&self, target: &VmTarget) -> Result<Vec<NsgLayer>> {
        let vm = self.vm(target)?;
        [
            (NsgScope::Subnet, &vm.subnet_nsg),
            (NsgScope::NetworkInterface, &vm.nic_nsg),
        ]
        .into_iter()
        .filter_map(|(scope, name)| name.as_deref().map(|name| (scope, name)))
        .map(|(scope, name)| Ok(NsgLayer::new(scope, self.rule_set(name)?)))
        .collect()
    }
}

fn vm_not_found(target: &VmTarget) -> AppError {
    AppError::VmNotFound {
        resource_group: target.resource_group.clone(),
        vm: target.vm.clone(),
    }
}

/// Cloud backed by a snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotCloud {
    path: PathBuf,
}

impl SnapshotCloud {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Snapshot> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| AppError::SnapshotLoad {
                path: self.path.clone(),
                source,
            })?;
        toml::from_str(&contents).map_err(|source| AppError::SnapshotParse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the snapshot through a temporary file and rename it into place
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let contents = toml::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("toml.tmp");
        let write_err = |source| AppError::SnapshotWrite {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&tmp, contents).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_err)?;
        debug!("Wrote snapshot {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl CloudInventory for SnapshotCloud {
    async fn power_state(&self, target: &VmTarget) -> Result<PowerState> {
        let snapshot = self.load().await?;
        Ok(snapshot.vm(target)?.power_state)
    }

    async fn network_addresses(&self, target: &VmTarget) -> Result<NetworkAddresses> {
        let snapshot = self.load().await?;
        Ok(snapshot.vm(target)?.addresses())
    }

    async fn network_security_groups(&self, target: &VmTarget) -> Result<Vec<NsgLayer>> {
        self.load().await?.layers(target)
    }
}

#[async_trait]
impl CloudRemediator for SnapshotCloud {
    async fn start_vm(&self, target: &VmTarget) -> Result<()> {
        let mut snapshot = self.load().await?;
        let vm = snapshot.vm_mut(target)?;
        if vm.power_state.is_running() {
            return Ok(());
        }
        info!(vm = %target, from = %vm.power_state, "starting VM");
        vm.power_state = PowerState::Running;
        self.save(&snapshot).await
    }

    async fn apply_rule_action(&self, nsg: &str, action: &RemediationAction) -> Result<()> {
        let mut snapshot = self.load().await?;
        let mut rule_set = snapshot.rule_set(nsg)?;
        rule_set.apply(action)?;

        let record = snapshot
            .nsgs
            .get_mut(nsg)
            .ok_or_else(|| AppError::NsgNotFound(nsg.to_string()))?;
        if record.security_rules == rule_set.security_rules {
            debug!(nsg, %action, "already in effect");
            return Ok(());
        }
        record.security_rules = rule_set.security_rules;
        info!(nsg, %action, "applied");
        self.save(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsg_eval::{Access, Direction, FieldValue, Protocol, RuleField};
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"
[vms.web-01]
resource_group = "rdp-test-rg"
power_state = "PowerState/deallocated"
nic_nsg = "web-01-nsg"
subnet_nsg = "subnet-nsg"
private_ip = "10.0.0.4"

[[nsgs.web-01-nsg.security_rules]]
name = "AllowRDP"
priority = 300
direction = "Inbound"
access = "Allow"
protocol = "Udp"
source_port_range = "*"
destination_port_range = "3389"
source_address_prefix = "*"
destination_address_prefix = "*"

[nsgs.subnet-nsg]
"#;

    fn cloud(dir: &TempDir) -> SnapshotCloud {
        let path = dir.path().join("env.toml");
        std::fs::write(&path, SNAPSHOT).unwrap();
        SnapshotCloud::new(path)
    }

    fn target() -> VmTarget {
        VmTarget::new("RDP-TEST-RG", "web-01")
    }

    #[tokio::test]
    async fn test_reads_power_state_and_layers() {
        let dir = TempDir::new().unwrap();
        let cloud = cloud(&dir);

        assert_eq!(cloud.power_state(&target()).await.unwrap(), PowerState::Deallocated);

        let addresses = cloud.network_addresses(&target()).await.unwrap();
        assert_eq!(addresses.public_ip, None);
        assert_eq!(addresses.private_ip, Some("10.0.0.4".parse().unwrap()));
        assert_eq!(addresses.to_string(), "public none, private 10.0.0.4");

        let layers = cloud.network_security_groups(&target()).await.unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].scope, NsgScope::Subnet);
        assert!(layers[0].rule_set.is_empty());
        assert_eq!(layers[1].rule_set.name, "web-01-nsg");
        assert_eq!(layers[1].rule_set.security_rules[0].protocol, Protocol::Udp);
    }

    #[tokio::test]
    async fn test_unknown_vm() {
        let dir = TempDir::new().unwrap();
        let cloud = cloud(&dir);
        let err = cloud
            .power_state(&VmTarget::new("other-rg", "web-01"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::VmNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_nsg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(
            &path,
            "[vms.a]\nresource_group = \"rg\"\npower_state = \"running\"\nnic_nsg = \"gone\"\n",
        )
        .unwrap();
        let err = SnapshotCloud::new(path)
            .network_security_groups(&VmTarget::new("rg", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NsgNotFound(ref name) if name == "gone"));
    }

    #[tokio::test]
    async fn test_malformed_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        std::fs::write(&path, "[vms.a]\nresource_group = 5\n").unwrap();
        let err = SnapshotCloud::new(path).load().await.unwrap_err();
        assert!(matches!(err, AppError::SnapshotParse { .. }));
    }

    #[tokio::test]
    async fn test_missing_snapshot_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let err = SnapshotCloud::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AppError::SnapshotLoad { path: ref p, .. } if *p == path));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[tokio::test]
    async fn test_start_vm_persists() {
        let dir = TempDir::new().unwrap();
        let cloud = cloud(&dir);
        cloud.start_vm(&target()).await.unwrap();
        cloud.start_vm(&target()).await.unwrap();
        assert_eq!(cloud.power_state(&target()).await.unwrap(), PowerState::Running);
    }

    #[tokio::test]
    async fn test_rule_actions_persist() {
        let dir = TempDir::new().unwrap();
        let cloud = cloud(&dir);

        let widen = RemediationAction::WidenRuleField {
            rule_name: "AllowRDP".into(),
            field: RuleField::Protocol,
            old_value: FieldValue::Protocol(Protocol::Udp),
            new_value: FieldValue::Protocol(Protocol::Tcp),
        };
        cloud.apply_rule_action("web-01-nsg", &widen).await.unwrap();
        cloud.apply_rule_action("web-01-nsg", &widen).await.unwrap();

        let insert = RemediationAction::InsertAllowRule {
            rule: SecurityRule::new("AllowRDP-2", 1000, Direction::Inbound, Access::Allow),
        };
        cloud.apply_rule_action("subnet-nsg", &insert).await.unwrap();

        let snapshot = cloud.load().await.unwrap();
        assert_eq!(
            snapshot.nsgs["web-01-nsg"].security_rules[0].protocol,
            Protocol::Tcp
        );
        assert_eq!(snapshot.nsgs["subnet-nsg"].security_rules.len(), 1);
        assert!(!cloud.path().with_extension("toml.tmp").exists());
    }
}
