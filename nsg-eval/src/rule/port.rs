//! Port ranges as they appear in NSG rules

use super::traffic::PortQuery;
use super::OneOrMany;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One port entry of a rule: `*`, `3389` or `3000-4000`
///
/// Parsing only checks syntax. A reversed range such as `4000-3000` parses and
/// is rejected later by rule-set validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRange {
    Any,
    Single(u16),
    Range { min: u16, max: u16 },
}

impl PortRange {
    /// Check if a concrete port falls inside this entry
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            PortRange::Any => true,
            PortRange::Single(p) => p == port,
            PortRange::Range { min, max } => min <= port && port <= max,
        }
    }

    /// True when the entry admits every port (`*` or `0-65535`)
    pub fn covers_all(&self) -> bool {
        match *self {
            PortRange::Any => true,
            PortRange::Single(_) => false,
            PortRange::Range { min, max } => min == 0 && max == u16::MAX,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        match *self {
            PortRange::Range { min, max } => min <= max,
            _ => true,
        }
    }
}

impl FromStr for PortRange {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(PortRange::Any);
        }

        let invalid = || ValidationError::InvalidPortSpec {
            spec: s.to_string(),
        };

        match s.split_once('-') {
            Some((lo, hi)) => {
                let min = lo.trim().parse::<u16>().map_err(|_| invalid())?;
                let max = hi.trim().parse::<u16>().map_err(|_| invalid())?;
                Ok(PortRange::Range { min, max })
            }
            None => s.parse::<u16>().map(PortRange::Single).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRange::Any => write!(f, "*"),
            PortRange::Single(p) => write!(f, "{}", p),
            PortRange::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

/// The full port field of a rule: one or more entries, matching if any does
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "OneOrMany", into = "OneOrMany")]
pub struct PortSpec(Vec<PortRange>);

impl PortSpec {
    pub fn any() -> Self {
        Self(vec![PortRange::Any])
    }

    pub fn single(port: u16) -> Self {
        Self(vec![PortRange::Single(port)])
    }

    /// Build from explicit entries; an empty list is rejected
    pub fn new(entries: Vec<PortRange>) -> Result<Self, ValidationError> {
        if entries.is_empty() {
            return Err(ValidationError::InvalidPortSpec {
                spec: String::new(),
            });
        }
        Ok(Self(entries))
    }

    pub fn entries(&self) -> &[PortRange] {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0.iter().any(PortRange::covers_all)
    }

    /// Check whether this field admits the queried port(s)
    ///
    /// A wildcard query only matches a field that covers every port.
    pub fn matches(&self, query: PortQuery) -> bool {
        match query {
            PortQuery::Any => self.is_any(),
            PortQuery::Port(port) => self.0.iter().any(|r| r.contains(port)),
        }
    }

    /// True when `port` is the only port this field admits
    pub fn admits_only(&self, port: u16) -> bool {
        self.0.iter().all(|r| match *r {
            PortRange::Any => false,
            PortRange::Single(p) => p == port,
            PortRange::Range { min, max } => min == port && max == port,
        })
    }

    /// Return a copy that also admits `port`, leaving existing entries intact
    pub fn with_port(&self, port: u16) -> Self {
        if self.matches(PortQuery::Port(port)) {
            return self.clone();
        }
        let mut entries = self.0.clone();
        entries.push(PortRange::Single(port));
        Self(entries)
    }
}

impl FromStr for PortSpec {
    type Err = ValidationError;

    /// Parse a comma-separated list such as `3389,5000-5100`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entries = s
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<PortRange>, _>>()?;
        Self::new(entries).map_err(|_| ValidationError::InvalidPortSpec {
            spec: s.to_string(),
        })
    }
}

impl TryFrom<OneOrMany> for PortSpec {
    type Error = ValidationError;

    fn try_from(raw: OneOrMany) -> Result<Self, Self::Error> {
        let entries = raw
            .into_entries()
            .iter()
            .map(|e| e.parse())
            .collect::<Result<Vec<PortRange>, _>>()?;
        Self::new(entries)
    }
}

impl From<PortSpec> for OneOrMany {
    fn from(spec: PortSpec) -> Self {
        OneOrMany::from_entries(spec.0.iter().map(ToString::to_string).collect())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_range() {
        assert_eq!("*".parse::<PortRange>().unwrap(), PortRange::Any);
        assert_eq!("3389".parse::<PortRange>().unwrap(), PortRange::Single(3389));
        assert_eq!(
            "3000-4000".parse::<PortRange>().unwrap(),
            PortRange::Range { min: 3000, max: 4000 }
        );
        assert!("rdp".parse::<PortRange>().is_err());
        assert!("70000".parse::<PortRange>().is_err());
        assert!("1-".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_reversed_range_parses_but_is_malformed() {
        let range: PortRange = "4000-3000".parse().unwrap();
        assert!(!range.is_well_formed());
        assert!(!range.contains(3389));
    }

    #[test]
    fn test_range_containment() {
        let range = PortRange::Range { min: 3380, max: 3390 };
        assert!(range.contains(3380));
        assert!(range.contains(3389));
        assert!(range.contains(3390));
        assert!(!range.contains(3391));
        assert!(!PortRange::Single(3390).contains(3389));
    }

    #[test]
    fn test_wildcard_query_needs_full_coverage() {
        assert!(PortSpec::any().matches(PortQuery::Any));
        assert!("0-65535".parse::<PortSpec>().unwrap().matches(PortQuery::Any));
        assert!(!"1024-65535".parse::<PortSpec>().unwrap().matches(PortQuery::Any));
        assert!(!PortSpec::single(3389).matches(PortQuery::Any));
    }

    #[test]
    fn test_port_list_matches_any_entry() {
        let spec: PortSpec = "22,3389,5000-5100".parse().unwrap();
        assert_eq!(spec.entries().len(), 3);
        assert!(spec.matches(PortQuery::Port(3389)));
        assert!(spec.matches(PortQuery::Port(5050)));
        assert!(!spec.matches(PortQuery::Port(80)));
    }

    #[test]
    fn test_with_port_keeps_existing_entries() {
        let spec = PortSpec::single(3390);
        let widened = spec.with_port(3389);
        assert_eq!(widened.to_string(), "3390,3389");

        let already = PortSpec::any();
        assert_eq!(already.with_port(3389), PortSpec::any());
    }

    #[test]
    fn test_admits_only() {
        assert!(PortSpec::single(3389).admits_only(3389));
        assert!("3389,3389-3389".parse::<PortSpec>().unwrap().admits_only(3389));
        assert!(!"22,3389".parse::<PortSpec>().unwrap().admits_only(3389));
        assert!(!"3000-4000".parse::<PortSpec>().unwrap().admits_only(3389));
        assert!(!PortSpec::any().admits_only(3389));
        assert!(!PortSpec::single(3390).admits_only(3389));
    }

    #[test]
    fn test_empty_spec_rejected() {
        assert!(PortSpec::new(vec![]).is_err());
        assert!("".parse::<PortSpec>().is_err());
    }
}
