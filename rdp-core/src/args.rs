//! Command-line arguments for enable-rdp

use crate::config::{Config, OutputFormat};
use crate::error::{AppError, Result};
use crate::inventory::VmTarget;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Arguments that select the VM and shape the check
#[derive(Parser, Debug)]
pub struct CommonArgs {
    /// Resource group containing the VM
    #[arg(long, short = 'g')]
    pub resource_group: String,

    /// Name of the VM
    #[arg(long)]
    pub vm: String,

    /// Azure subscription (recorded in the report)
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Environment snapshot to inspect and remediate
    #[arg(long, env = "ENABLE_RDP_SNAPSHOT", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Apply the remediation plan and confirm the result
    #[arg(long, short = 'f')]
    pub auto_fix: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Check reachability from this client address instead of from anywhere
    #[arg(long, value_name = "IP")]
    pub source_ip: Option<IpAddr>,

    /// RDP port, if the VM listens on a non-default one
    #[arg(long)]
    pub port: Option<u16>,

    /// Configuration file (TOML format), applied over all other layers
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print evaluation and planning details to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Overlay command-line settings onto the loaded configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(output) = self.output {
            config.common.output = output;
        }
        if self.verbose {
            config.common.verbose = true;
        }
        if let Some(ip) = self.source_ip {
            config.traffic.source = Some(ip);
        }
        if let Some(port) = self.port {
            config.traffic.destination_port = port;
        }
        if let Some(snapshot) = &self.snapshot {
            config.inventory.snapshot = Some(snapshot.clone());
        }
    }

    pub fn target(&self) -> VmTarget {
        VmTarget::new(&self.resource_group, &self.vm).with_subscription(self.subscription_id.clone())
    }

    /// The snapshot to use, from the command line or the configuration
    pub fn snapshot_path(&self, config: &Config) -> Result<PathBuf> {
        self.snapshot
            .clone()
            .or_else(|| config.inventory.snapshot.clone())
            .ok_or(AppError::NoInventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsg_eval::Endpoint;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        common: CommonArgs,
    }

    fn parse(args: &[&str]) -> CommonArgs {
        TestCli::try_parse_from(std::iter::once("enable-rdp").chain(args.iter().copied()))
            .unwrap()
            .common
    }

    #[test]
    fn test_required_arguments() {
        assert!(TestCli::try_parse_from(["enable-rdp", "--vm", "web-01"]).is_err());
        let args = parse(&["-g", "rg", "--vm", "web-01"]);
        assert_eq!(args.target(), VmTarget::new("rg", "web-01").with_subscription(args.subscription_id.clone()));
        assert!(!args.auto_fix);
    }

    #[test]
    fn test_overrides_config() {
        let args = parse(&[
            "-g", "rg", "--vm", "web-01", "-f", "--output", "json", "--source-ip", "203.0.113.7",
            "--port", "3390", "--snapshot", "/tmp/env.toml",
        ]);
        let mut config = Config::default();
        args.apply_to(&mut config);

        assert!(args.auto_fix);
        assert_eq!(config.common.output, OutputFormat::Json);
        assert_eq!(config.traffic.destination_port, 3390);
        assert_eq!(
            config.traffic.descriptor().source,
            Endpoint::Ip("203.0.113.7".parse().unwrap())
        );
        assert_eq!(args.snapshot_path(&config).unwrap(), PathBuf::from("/tmp/env.toml"));
    }

    #[test]
    fn test_snapshot_from_config() {
        let mut args = parse(&["-g", "rg", "--vm", "web-01"]);
        // ENABLE_RDP_SNAPSHOT may be set in the environment running the tests
        args.snapshot = None;

        let mut config = Config::default();
        assert!(matches!(args.snapshot_path(&config), Err(AppError::NoInventory)));
        config.inventory.snapshot = Some(PathBuf::from("env.toml"));
        assert_eq!(args.snapshot_path(&config).unwrap(), PathBuf::from("env.toml"));
    }

    #[test]
    fn test_invalid_source_ip() {
        assert!(TestCli::try_parse_from([
            "enable-rdp", "-g", "rg", "--vm", "web-01", "--source-ip", "not-an-ip"
        ])
        .is_err());
    }
}
