//! Rule-set validation: priority collisions, duplicate names, malformed ranges

use crate::error::{Result, ValidationError};
use crate::rule::{Direction, PortSpec, RuleSet};
use std::collections::{HashMap, HashSet};

pub struct RuleSetValidator;

impl RuleSetValidator {
    /// Validate a rule set before it is evaluated or planned against
    pub fn validate(rule_set: &RuleSet) -> Result<()> {
        Self::check_names(rule_set)?;
        Self::check_priorities(rule_set)?;
        Self::check_ranges(rule_set)?;
        Ok(())
    }

    fn check_names(rule_set: &RuleSet) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &rule_set.security_rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(ValidationError::DuplicateName {
                    name: rule.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Priority must be unique per direction
    fn check_priorities(rule_set: &RuleSet) -> Result<()> {
        let mut seen: HashMap<(Direction, u16), &str> = HashMap::new();
        for rule in &rule_set.security_rules {
            if let Some(first) = seen.insert((rule.direction, rule.priority), &rule.name) {
                return Err(ValidationError::DuplicatePriority {
                    direction: rule.direction,
                    priority: rule.priority,
                    first: first.to_string(),
                    second: rule.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_ranges(rule_set: &RuleSet) -> Result<()> {
        for rule in &rule_set.security_rules {
            Self::check_port_spec(&rule.name, &rule.source_port_range)?;
            Self::check_port_spec(&rule.name, &rule.destination_port_range)?;
        }
        Ok(())
    }

    fn check_port_spec(rule: &str, spec: &PortSpec) -> Result<()> {
        if let Some(bad) = spec.entries().iter().find(|r| !r.is_well_formed()) {
            return Err(ValidationError::InvalidPortRange {
                rule: rule.to_string(),
                range: bad.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NsgError;
    use crate::rule::{Access, PortRange, SecurityRule};

    #[test]
    fn test_valid_rule_set() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                SecurityRule::new("in", 100, Direction::Inbound, Access::Deny),
                // Same priority in the other direction is fine
                SecurityRule::new("out", 100, Direction::Outbound, Access::Deny),
            ],
        );
        assert!(RuleSetValidator::validate(&rules).is_ok());
        assert!(RuleSetValidator::validate(&RuleSet::default()).is_ok());
    }

    #[test]
    fn test_duplicate_priority() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                SecurityRule::new("a", 200, Direction::Inbound, Access::Deny),
                SecurityRule::new("b", 200, Direction::Inbound, Access::Allow),
            ],
        );
        let err = RuleSetValidator::validate(&rules).unwrap_err();
        assert!(matches!(
            err,
            NsgError::InvalidRuleConfiguration(ValidationError::DuplicatePriority { priority: 200, .. })
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                SecurityRule::new("a", 200, Direction::Inbound, Access::Deny),
                SecurityRule::new("a", 300, Direction::Inbound, Access::Allow),
            ],
        );
        assert!(matches!(
            RuleSetValidator::validate(&rules),
            Err(NsgError::InvalidRuleConfiguration(ValidationError::DuplicateName { .. }))
        ));
    }

    #[test]
    fn test_reversed_range() {
        let rules = RuleSet::new(
            "nsg",
            vec![SecurityRule::new("a", 200, Direction::Inbound, Access::Allow)
                .with_destination_ports(
                    PortSpec::new(vec![PortRange::Range { min: 4000, max: 3000 }]).unwrap(),
                )],
        );
        let err = RuleSetValidator::validate(&rules).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid rule configuration: Invalid port range 4000-3000 in rule a"
        );
    }
}
