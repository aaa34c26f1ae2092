//! Address prefixes: CIDR blocks, single hosts, service tags and wildcards

use super::traffic::Endpoint;
use super::OneOrMany;
use crate::error::ValidationError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Service tags that stand for every address on the evaluation path
const OPEN_TAGS: &[&str] = &["Internet", "Any"];

/// One address entry of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddressPrefix {
    /// `*`
    Any,
    /// CIDR block; a bare IP is stored as a host prefix
    Net(IpNet),
    /// Service tag such as `Internet`, `VirtualNetwork` or `Storage.WestEurope`
    Tag(String),
}

impl AddressPrefix {
    /// True when the entry admits every source/destination
    pub fn covers_all(&self) -> bool {
        match self {
            AddressPrefix::Any => true,
            AddressPrefix::Net(net) => net.prefix_len() == 0,
            AddressPrefix::Tag(tag) => is_open_tag(tag),
        }
    }

    /// Check if a concrete address falls inside this entry
    ///
    /// Tags other than `Internet`/`Any` resolve to address sets owned by the
    /// platform and are treated as non-matching.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match self {
            AddressPrefix::Any => true,
            AddressPrefix::Net(net) => net.contains(&ip),
            AddressPrefix::Tag(tag) => is_open_tag(tag),
        }
    }
}

fn is_open_tag(tag: &str) -> bool {
    OPEN_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.starts_with(|c: char| c.is_ascii_alphabetic())
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl FromStr for AddressPrefix {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(AddressPrefix::Any);
        }
        if let Ok(net) = s.parse::<IpNet>() {
            return Ok(AddressPrefix::Net(net));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(AddressPrefix::Net(IpNet::from(ip)));
        }
        if is_valid_tag(s) {
            return Ok(AddressPrefix::Tag(s.to_string()));
        }
        Err(ValidationError::InvalidAddress {
            prefix: s.to_string(),
        })
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressPrefix::Any => write!(f, "*"),
            AddressPrefix::Net(net) if net.prefix_len() == net.max_prefix_len() => {
                write!(f, "{}", net.addr())
            }
            AddressPrefix::Net(net) => write!(f, "{}", net),
            AddressPrefix::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

/// The full address field of a rule: one or more prefixes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OneOrMany", into = "OneOrMany")]
pub struct AddressSpec(Vec<AddressPrefix>);

impl AddressSpec {
    pub fn any() -> Self {
        Self(vec![AddressPrefix::Any])
    }

    pub fn host(ip: IpAddr) -> Self {
        Self(vec![AddressPrefix::Net(IpNet::from(ip))])
    }

    pub fn new(entries: Vec<AddressPrefix>) -> Result<Self, ValidationError> {
        if entries.is_empty() {
            return Err(ValidationError::InvalidAddress {
                prefix: String::new(),
            });
        }
        Ok(Self(entries))
    }

    pub fn entries(&self) -> &[AddressPrefix] {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0.iter().any(AddressPrefix::covers_all)
    }

    /// Check whether this field admits the queried endpoint
    ///
    /// A wildcard query (reachability from anywhere) only matches a field that
    /// covers every address.
    pub fn matches(&self, query: Endpoint) -> bool {
        match query {
            Endpoint::Any => self.is_any(),
            Endpoint::Ip(ip) => self.0.iter().any(|p| p.contains(ip)),
        }
    }

    /// Return a copy that also admits `query`
    pub fn admitting(&self, query: Endpoint) -> Self {
        if self.matches(query) {
            return self.clone();
        }
        match query {
            Endpoint::Any => Self::any(),
            Endpoint::Ip(ip) => {
                let mut entries = self.0.clone();
                entries.push(AddressPrefix::Net(IpNet::from(ip)));
                Self(entries)
            }
        }
    }
}

impl FromStr for AddressSpec {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<AddressPrefix>, _>>()?;
        Self::new(entries).map_err(|_| ValidationError::InvalidAddress {
            prefix: s.to_string(),
        })
    }
}

impl TryFrom<OneOrMany> for AddressSpec {
    type Error = ValidationError;

    fn try_from(raw: OneOrMany) -> Result<Self, Self::Error> {
        let entries = raw
            .into_entries()
            .iter()
            .map(|e| e.parse())
            .collect::<Result<Vec<AddressPrefix>, _>>()?;
        Self::new(entries)
    }
}

impl From<AddressSpec> for OneOrMany {
    fn from(spec: AddressSpec) -> Self {
        OneOrMany::from_entries(spec.0.iter().map(ToString::to_string).collect())
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_prefix_kinds() {
        assert_eq!("*".parse::<AddressPrefix>().unwrap(), AddressPrefix::Any);
        assert!(matches!(
            "10.0.0.0/8".parse::<AddressPrefix>().unwrap(),
            AddressPrefix::Net(_)
        ));
        assert!(matches!(
            "Storage.WestEurope".parse::<AddressPrefix>().unwrap(),
            AddressPrefix::Tag(_)
        ));
        assert!("10.0.0.0/33".parse::<AddressPrefix>().is_err());
        assert!("not a tag!".parse::<AddressPrefix>().is_err());
    }

    #[test]
    fn test_single_ip_is_host_prefix() {
        let prefix: AddressPrefix = "192.168.1.100".parse().unwrap();
        assert!(prefix.contains(ip("192.168.1.100")));
        assert!(!prefix.contains(ip("192.168.1.101")));
        assert_eq!(prefix.to_string(), "192.168.1.100");
    }

    #[test]
    fn test_cidr_containment() {
        let prefix: AddressPrefix = "203.0.113.0/24".parse().unwrap();
        assert!(prefix.contains(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))));
        assert!(!prefix.contains(ip("203.0.114.7")));
        assert!(!prefix.contains(ip("2001:db8::1")));
        assert!(!prefix.covers_all());
        assert!("0.0.0.0/0".parse::<AddressPrefix>().unwrap().covers_all());
    }

    #[test]
    fn test_service_tags() {
        let internet: AddressPrefix = "Internet".parse().unwrap();
        let any_tag: AddressPrefix = "any".parse().unwrap();
        let vnet: AddressPrefix = "VirtualNetwork".parse().unwrap();

        assert!(internet.covers_all());
        assert!(any_tag.covers_all());
        assert!(internet.contains(ip("198.51.100.1")));
        assert!(!vnet.covers_all());
        assert!(!vnet.contains(ip("10.0.1.4")));
    }

    #[test]
    fn test_spec_matching_against_queries() {
        let restricted: AddressSpec = "192.168.1.100".parse().unwrap();
        assert!(!restricted.matches(Endpoint::Any));
        assert!(restricted.matches(Endpoint::Ip(ip("192.168.1.100"))));

        let list: AddressSpec = "10.0.0.0/8,Internet".parse().unwrap();
        assert!(list.matches(Endpoint::Any));
    }

    #[test]
    fn test_admitting_widens_minimally() {
        let restricted: AddressSpec = "192.168.1.100".parse().unwrap();
        assert_eq!(restricted.admitting(Endpoint::Any), AddressSpec::any());

        let widened = restricted.admitting(Endpoint::Ip(ip("198.51.100.9")));
        assert_eq!(widened.to_string(), "192.168.1.100,198.51.100.9");
    }
}
