//! Configuration schema types

use crate::error::{AppError, Result};
use nsg_eval::{PlannerOptions, Protocol, TrafficDescriptor, RDP_PORT};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
    #[serde(default)]
    pub planner: PlannerOptions,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl Config {
    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        let planner = &self.planner;
        if planner.priority_floor > planner.priority_ceiling {
            return Err(AppError::ConfigError(format!(
                "planner.priority_floor ({}) is above planner.priority_ceiling ({})",
                planner.priority_floor, planner.priority_ceiling
            )));
        }
        if !(planner.priority_floor..=planner.priority_ceiling).contains(&planner.default_priority)
        {
            return Err(AppError::ConfigError(format!(
                "planner.default_priority ({}) is outside {}-{}",
                planner.default_priority, planner.priority_floor, planner.priority_ceiling
            )));
        }
        if planner.rule_name.trim().is_empty() {
            return Err(AppError::ConfigError(
                "planner.rule_name must not be empty".to_string(),
            ));
        }
        if self.traffic.destination_port == 0 {
            return Err(AppError::ConfigError(
                "traffic.destination_port must be 1-65535".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings shared by every invocation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommonConfig {
    #[serde(default = "default_config_version")]
    pub config_version: String,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub output: OutputFormat,
}

fn default_config_version() -> String {
    "1.0".to_string()
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            verbose: false,
            output: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

/// The traffic whose reachability is checked
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficConfig {
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default = "default_port")]
    pub destination_port: u16,
    /// Client address; unset means "from anywhere"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<IpAddr>,
}

fn default_protocol() -> Protocol {
    Protocol::Tcp
}

fn default_port() -> u16 {
    RDP_PORT
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            destination_port: default_port(),
            source: None,
        }
    }
}

impl TrafficConfig {
    pub fn descriptor(&self) -> TrafficDescriptor {
        let mut traffic = TrafficDescriptor::inbound_tcp(self.destination_port);
        traffic.protocol = self.protocol;
        match self.source {
            Some(ip) => traffic.from_source(ip),
            None => traffic,
        }
    }
}

/// Where the VM and security group state comes from
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Environment snapshot file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}
