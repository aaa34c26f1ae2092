//! First-match-wins evaluation of a rule set against a traffic descriptor

use super::matcher::RuleMatcher;
use super::validator::RuleSetValidator;
use crate::error::Result;
use crate::rule::{Access, RuleSet, SecurityRule, TrafficDescriptor};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reachability {
    Allowed,
    Denied,
}

impl From<Access> for Reachability {
    fn from(access: Access) -> Self {
        match access {
            Access::Allow => Reachability::Allowed,
            Access::Deny => Reachability::Denied,
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Allowed => write!(f, "Allowed"),
            Reachability::Denied => write!(f, "Denied"),
        }
    }
}

/// Outcome of evaluating one rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityVerdict {
    pub reachability: Reachability,
    /// The first matching rule; `None` means the implicit default deny applied
    pub deciding_rule: Option<SecurityRule>,
    /// Allow rules that match the traffic but sit behind the deciding deny,
    /// in evaluation order
    pub shadowed_allows: Vec<SecurityRule>,
}

impl ReachabilityVerdict {
    pub fn is_allowed(&self) -> bool {
        self.reachability == Reachability::Allowed
    }

    /// Human-readable reason for the verdict
    pub fn explanation(&self) -> String {
        match (&self.deciding_rule, self.reachability) {
            (None, Reachability::Denied) => {
                "no rule matches; implicit default deny applies".to_string()
            }
            (None, Reachability::Allowed) => "no security group filters this traffic".to_string(),
            (Some(rule), Reachability::Allowed) => {
                format!("allowed by {} (priority {})", rule.name, rule.priority)
            }
            (Some(rule), Reachability::Denied) if self.shadowed_allows.is_empty() => {
                format!("denied by {} (priority {})", rule.name, rule.priority)
            }
            (Some(rule), Reachability::Denied) => {
                let shadowed: Vec<&str> =
                    self.shadowed_allows.iter().map(|r| r.name.as_str()).collect();
                format!(
                    "denied by {} (priority {}), shadowing {}",
                    rule.name,
                    rule.priority,
                    shadowed.join(", ")
                )
            }
        }
    }
}

/// Evaluate `traffic` against `rule_set` the way the platform does
///
/// Rules of the traffic's direction are walked in ascending priority and the
/// first rule whose fields all match decides. A more specific rule further
/// down never overrides an earlier match. With no match the verdict is the
/// implicit default deny.
pub fn evaluate(rule_set: &RuleSet, traffic: &TrafficDescriptor) -> Result<ReachabilityVerdict> {
    RuleSetValidator::validate(rule_set)?;

    let matcher = RuleMatcher::new(traffic);
    let ordered = rule_set.ordered(traffic.direction);

    let Some(position) = ordered.iter().position(|r| matcher.matches_fields(r)) else {
        debug!(nsg = %rule_set.name, %traffic, "no rule matched; default deny");
        return Ok(ReachabilityVerdict {
            reachability: Reachability::Denied,
            deciding_rule: None,
            shadowed_allows: Vec::new(),
        });
    };

    let deciding = ordered[position];
    let reachability = Reachability::from(deciding.access);
    let shadowed_allows = if reachability == Reachability::Denied {
        ordered[position + 1..]
            .iter()
            .filter(|r| r.access == Access::Allow && matcher.matches_fields(r))
            .map(|r| (*r).clone())
            .collect()
    } else {
        Vec::new()
    };

    debug!(
        nsg = %rule_set.name,
        rule = %deciding.name,
        priority = deciding.priority,
        %reachability,
        "first matching rule"
    );

    Ok(ReachabilityVerdict {
        reachability,
        deciding_rule: Some(deciding.clone()),
        shadowed_allows,
    })
}

/// Deny rules that match `traffic` and are evaluated before `priority`
pub fn blocking_denies<'r>(
    rule_set: &'r RuleSet,
    traffic: &TrafficDescriptor,
    priority: u16,
) -> Vec<&'r SecurityRule> {
    let matcher = RuleMatcher::new(traffic);
    rule_set
        .ordered(traffic.direction)
        .into_iter()
        .filter(|r| r.priority < priority && r.access == Access::Deny && matcher.matches_fields(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NsgError, ValidationError};
    use crate::rule::{Direction, PortSpec, Protocol};

    fn rdp(name: &str, priority: u16, access: Access) -> SecurityRule {
        SecurityRule::new(name, priority, Direction::Inbound, access)
            .with_protocol(Protocol::Tcp)
            .with_destination_ports(PortSpec::single(3389))
    }

    #[test]
    fn test_empty_rule_set_is_denied() {
        let verdict = evaluate(&RuleSet::default(), &TrafficDescriptor::rdp()).unwrap();
        assert_eq!(verdict.reachability, Reachability::Denied);
        assert!(verdict.deciding_rule.is_none());
        assert!(verdict.shadowed_allows.is_empty());
    }

    #[test]
    fn test_default_deny_for_non_matching_rules() {
        let rules = RuleSet::new(
            "nsg",
            vec![SecurityRule::new("AllowHTTP", 1001, Direction::Inbound, Access::Allow)
                .with_protocol(Protocol::Tcp)
                .with_destination_ports(PortSpec::single(80))],
        );
        let verdict = evaluate(&rules, &TrafficDescriptor::rdp()).unwrap();
        assert!(!verdict.is_allowed());
        assert!(verdict.deciding_rule.is_none());
    }

    #[test]
    fn test_first_match_wins_over_specificity() {
        // The broad allow at 100 wins even though a more specific deny follows
        let rules = RuleSet::new(
            "nsg",
            vec![
                rdp("DenyOffice", 200, Access::Deny)
                    .with_source_addresses("0.0.0.0/0".parse().unwrap()),
                SecurityRule::new("AllowAll", 100, Direction::Inbound, Access::Allow),
            ],
        );
        let verdict = evaluate(&rules, &TrafficDescriptor::rdp()).unwrap();
        assert!(verdict.is_allowed());
        assert_eq!(verdict.deciding_rule.unwrap().name, "AllowAll");
    }

    #[test]
    fn test_input_order_is_irrelevant() {
        let rules = RuleSet::new(
            "nsg",
            vec![rdp("AllowRDP", 200, Access::Allow), rdp("DenyRDP", 100, Access::Deny)],
        );
        let verdict = evaluate(&rules, &TrafficDescriptor::rdp()).unwrap();
        assert_eq!(verdict.reachability, Reachability::Denied);
        assert_eq!(verdict.deciding_rule.as_ref().unwrap().name, "DenyRDP");
        assert_eq!(verdict.shadowed_allows.len(), 1);
        assert_eq!(verdict.shadowed_allows[0].name, "AllowRDP");
        assert_eq!(
            verdict.explanation(),
            "denied by DenyRDP (priority 100), shadowing AllowRDP"
        );
    }

    #[test]
    fn test_outbound_rules_ignored_for_inbound_traffic() {
        let rules = RuleSet::new(
            "nsg",
            vec![SecurityRule {
                direction: Direction::Outbound,
                ..rdp("AllowRDP", 100, Access::Allow)
            }],
        );
        let verdict = evaluate(&rules, &TrafficDescriptor::rdp()).unwrap();
        assert!(!verdict.is_allowed());
        assert!(verdict.deciding_rule.is_none());
    }

    #[test]
    fn test_shadowed_list_excludes_non_matching_allows() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                rdp("DenyAllRDP", 100, Access::Deny),
                rdp("AllowRDPFromOffice", 200, Access::Allow)
                    .with_source_addresses("203.0.113.0/24".parse().unwrap()),
                rdp("AllowRDPAny", 300, Access::Allow),
            ],
        );
        let verdict = evaluate(&rules, &TrafficDescriptor::rdp()).unwrap();
        let shadowed: Vec<&str> = verdict.shadowed_allows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(shadowed, vec!["AllowRDPAny"]);
    }

    #[test]
    fn test_duplicate_priority_is_fatal() {
        let rules = RuleSet::new(
            "nsg",
            vec![rdp("a", 100, Access::Deny), rdp("b", 100, Access::Allow)],
        );
        assert!(matches!(
            evaluate(&rules, &TrafficDescriptor::rdp()),
            Err(NsgError::InvalidRuleConfiguration(ValidationError::DuplicatePriority { .. }))
        ));
    }

    #[test]
    fn test_blocking_denies() {
        let rules = RuleSet::new(
            "nsg",
            vec![
                rdp("Deny1", 100, Access::Deny),
                rdp("Deny2", 150, Access::Deny),
                rdp("Allow", 200, Access::Allow),
                rdp("Deny3", 250, Access::Deny),
            ],
        );
        let names: Vec<&str> = blocking_denies(&rules, &TrafficDescriptor::rdp(), 200)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["Deny1", "Deny2"]);
    }
}
