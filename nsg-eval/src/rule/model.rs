//! Security rule and rule set types

use super::address::AddressSpec;
use super::port::PortSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Traffic direction a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    #[serde(alias = "inbound")]
    Inbound,
    #[serde(alias = "outbound")]
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "Inbound"),
            Direction::Outbound => write!(f, "Outbound"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    #[serde(alias = "allow")]
    Allow,
    #[serde(alias = "deny")]
    Deny,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Allow => write!(f, "Allow"),
            Access::Deny => write!(f, "Deny"),
        }
    }
}

/// Rule protocol, spelled the way the platform exports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(alias = "TCP", alias = "tcp")]
    Tcp,
    #[serde(alias = "UDP", alias = "udp")]
    Udp,
    #[serde(alias = "ICMP", alias = "icmp")]
    Icmp,
    #[serde(alias = "ESP")]
    Esp,
    #[serde(alias = "AH")]
    Ah,
    #[serde(rename = "*", alias = "Any", alias = "any")]
    Any,
}

impl Protocol {
    /// Check if a rule with this protocol admits traffic using `other`
    pub fn covers(self, other: Protocol) -> bool {
        self == Protocol::Any || self == other
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Tcp => "Tcp",
            Protocol::Udp => "Udp",
            Protocol::Icmp => "Icmp",
            Protocol::Esp => "Esp",
            Protocol::Ah => "Ah",
            Protocol::Any => "*",
        };
        write!(f, "{}", s)
    }
}

/// A matchable field of a security rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Direction,
    Protocol,
    SourceAddressPrefix,
    SourcePortRange,
    DestinationAddressPrefix,
    DestinationPortRange,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleField::Direction => "direction",
            RuleField::Protocol => "protocol",
            RuleField::SourceAddressPrefix => "sourceAddressPrefix",
            RuleField::SourcePortRange => "sourcePortRange",
            RuleField::DestinationAddressPrefix => "destinationAddressPrefix",
            RuleField::DestinationPortRange => "destinationPortRange",
        };
        write!(f, "{}", s)
    }
}

/// A single NSG security rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityRule {
    pub name: String,
    /// Lower values are evaluated first
    pub priority: u16,
    pub direction: Direction,
    pub access: Access,
    pub protocol: Protocol,
    #[serde(default = "PortSpec::any", alias = "source_port_ranges")]
    pub source_port_range: PortSpec,
    #[serde(alias = "destination_port_ranges")]
    pub destination_port_range: PortSpec,
    #[serde(default = "AddressSpec::any", alias = "source_address_prefixes")]
    pub source_address_prefix: AddressSpec,
    #[serde(default = "AddressSpec::any", alias = "destination_address_prefixes")]
    pub destination_address_prefix: AddressSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SecurityRule {
    /// Create a rule that matches any protocol, port and address
    pub fn new(name: impl Into<String>, priority: u16, direction: Direction, access: Access) -> Self {
        Self {
            name: name.into(),
            priority,
            direction,
            access,
            protocol: Protocol::Any,
            source_port_range: PortSpec::any(),
            destination_port_range: PortSpec::any(),
            source_address_prefix: AddressSpec::any(),
            destination_address_prefix: AddressSpec::any(),
            description: None,
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_source_ports(mut self, ports: PortSpec) -> Self {
        self.source_port_range = ports;
        self
    }

    pub fn with_destination_ports(mut self, ports: PortSpec) -> Self {
        self.destination_port_range = ports;
        self
    }

    pub fn with_source_addresses(mut self, addresses: AddressSpec) -> Self {
        self.source_address_prefix = addresses;
        self
    }

    pub fn with_destination_addresses(mut self, addresses: AddressSpec) -> Self {
        self.destination_address_prefix = addresses;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// One-line summary in the column order the portal uses
    pub fn summary(&self) -> String {
        format!(
            "{} ({}, {} {} {}, {}:{} -> {}:{})",
            self.name,
            self.priority,
            self.direction,
            self.access,
            self.protocol,
            self.source_address_prefix,
            self.source_port_range,
            self.destination_address_prefix,
            self.destination_port_range,
        )
    }
}

/// The rules of one network security group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, security_rules: Vec<SecurityRule>) -> Self {
        Self {
            name: name.into(),
            security_rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.security_rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SecurityRule> {
        self.security_rules.iter().find(|r| r.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut SecurityRule> {
        self.security_rules.iter_mut().find(|r| r.name == name)
    }

    /// Rules of one direction in evaluation order (ascending priority)
    pub fn ordered(&self, direction: Direction) -> Vec<&SecurityRule> {
        let mut rules: Vec<&SecurityRule> = self
            .security_rules
            .iter()
            .filter(|r| r.direction == direction)
            .collect();
        rules.sort_by_key(|r| r.priority);
        rules
    }

    /// Priorities already used by rules of one direction
    pub fn priorities(&self, direction: Direction) -> BTreeSet<u16> {
        self.security_rules
            .iter()
            .filter(|r| r.direction == direction)
            .map(|r| r.priority)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_azure_style_rule() {
        let toml_str = r#"
name = "AllowRDP"
priority = 300
direction = "Inbound"
access = "Allow"
protocol = "Tcp"
source_port_range = "*"
destination_port_ranges = ["3389", "5985-5986"]
source_address_prefixes = ["10.0.0.0/8", "192.168.1.100"]
destination_address_prefix = "*"
"#;
        let rule: SecurityRule = toml::from_str(toml_str).unwrap();
        assert_eq!(rule.priority, 300);
        assert_eq!(rule.protocol, Protocol::Tcp);
        assert_eq!(rule.destination_port_range.entries().len(), 2);
        assert_eq!(rule.source_address_prefix.to_string(), "10.0.0.0/8,192.168.1.100");
    }

    #[test]
    fn test_deserialize_wildcard_protocol_and_defaults() {
        let toml_str = r#"
name = "AllowAll"
priority = 4096
direction = "Inbound"
access = "Allow"
protocol = "*"
destination_port_range = "*"
"#;
        let rule: SecurityRule = toml::from_str(toml_str).unwrap();
        assert_eq!(rule.protocol, Protocol::Any);
        assert!(rule.source_address_prefix.is_any());
        assert!(rule.source_port_range.is_any());
    }

    #[test]
    fn test_deserialize_rejects_bad_port() {
        let toml_str = r#"
name = "Broken"
priority = 100
direction = "Inbound"
access = "Allow"
protocol = "Tcp"
destination_port_range = "rdp"
"#;
        assert!(toml::from_str::<SecurityRule>(toml_str).is_err());
    }

    #[test]
    fn test_ordered_filters_and_sorts() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                SecurityRule::new("c", 300, Direction::Inbound, Access::Allow),
                SecurityRule::new("out", 100, Direction::Outbound, Access::Deny),
                SecurityRule::new("a", 100, Direction::Inbound, Access::Deny),
            ],
        );
        let names: Vec<&str> = rules
            .ordered(Direction::Inbound)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(rules.priorities(Direction::Outbound).len(), 1);
    }

    #[test]
    fn test_summary() {
        let rule = SecurityRule::new("DenyRDP", 1000, Direction::Inbound, Access::Deny)
            .with_protocol(Protocol::Tcp)
            .with_destination_ports(PortSpec::single(3389));
        assert_eq!(
            rule.summary(),
            "DenyRDP (1000, Inbound Deny Tcp, *:* -> *:3389)"
        );
    }
}
