//! Remediation actions and their application to a rule set

use crate::error::{NsgError, Result, ValidationError};
use crate::rule::{
    AddressSpec, Direction, PortSpec, Protocol, RuleField, RuleSet, SecurityRule,
};
use serde::Serialize;
use std::fmt;

/// Value of a single rule field, carried by a widening action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Direction(Direction),
    Protocol(Protocol),
    Ports(PortSpec),
    Addresses(AddressSpec),
}

impl FieldValue {
    /// Current value of `field` in `rule`
    pub fn of(rule: &SecurityRule, field: RuleField) -> Self {
        match field {
            RuleField::Direction => FieldValue::Direction(rule.direction),
            RuleField::Protocol => FieldValue::Protocol(rule.protocol),
            RuleField::SourceAddressPrefix => {
                FieldValue::Addresses(rule.source_address_prefix.clone())
            }
            RuleField::SourcePortRange => FieldValue::Ports(rule.source_port_range.clone()),
            RuleField::DestinationAddressPrefix => {
                FieldValue::Addresses(rule.destination_address_prefix.clone())
            }
            RuleField::DestinationPortRange => {
                FieldValue::Ports(rule.destination_port_range.clone())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Direction(d) => write!(f, "{}", d),
            FieldValue::Protocol(p) => write!(f, "{}", p),
            FieldValue::Ports(p) => write!(f, "{}", p),
            FieldValue::Addresses(a) => write!(f, "{}", a),
        }
    }
}

impl SecurityRule {
    /// Overwrite one field; the value kind must fit the field
    pub fn set_field(
        &mut self,
        field: RuleField,
        value: &FieldValue,
    ) -> std::result::Result<(), ValidationError> {
        match (field, value) {
            (RuleField::Direction, FieldValue::Direction(d)) => self.direction = *d,
            (RuleField::Protocol, FieldValue::Protocol(p)) => self.protocol = *p,
            (RuleField::SourceAddressPrefix, FieldValue::Addresses(a)) => {
                self.source_address_prefix = a.clone()
            }
            (RuleField::SourcePortRange, FieldValue::Ports(p)) => {
                self.source_port_range = p.clone()
            }
            (RuleField::DestinationAddressPrefix, FieldValue::Addresses(a)) => {
                self.destination_address_prefix = a.clone()
            }
            (RuleField::DestinationPortRange, FieldValue::Ports(p)) => {
                self.destination_port_range = p.clone()
            }
            (field, value) => {
                return Err(ValidationError::FieldValueMismatch {
                    field,
                    value: value.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// One change to the VM or to a security group
///
/// Rules are never deleted and their access is never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationAction {
    StartVm,
    InsertAllowRule {
        rule: SecurityRule,
    },
    RaiseRulePriority {
        rule_name: String,
        old_priority: u16,
        new_priority: u16,
    },
    WidenRuleField {
        rule_name: String,
        field: RuleField,
        old_value: FieldValue,
        new_value: FieldValue,
    },
}

impl RemediationAction {
    /// Short imperative description
    pub fn describe(&self) -> String {
        match self {
            RemediationAction::StartVm => "Start the VM".to_string(),
            RemediationAction::InsertAllowRule { rule } => {
                format!("Insert rule {}", rule.summary())
            }
            RemediationAction::RaiseRulePriority {
                rule_name,
                old_priority,
                new_priority,
            } => format!(
                "Move rule {} from priority {} to {}",
                rule_name, old_priority, new_priority
            ),
            RemediationAction::WidenRuleField {
                rule_name,
                field,
                old_value,
                new_value,
            } => format!(
                "Change {} of rule {} from {} to {}",
                field, rule_name, old_value, new_value
            ),
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// An action together with its target and the reason for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    /// Security group the action applies to; `None` for VM actions
    pub nsg: Option<String>,
    pub action: RemediationAction,
    pub justification: String,
}

/// Ordered remediation steps; empty when the traffic is already reachable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemediationPlan {
    pub steps: Vec<PlanStep>,
}

impl RemediationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn actions(&self) -> impl Iterator<Item = &RemediationAction> {
        self.steps.iter().map(|s| &s.action)
    }

    /// Steps that target one security group
    pub fn steps_for<'a>(&'a self, nsg: &'a str) -> impl Iterator<Item = &'a PlanStep> {
        self.steps
            .iter()
            .filter(move |s| s.nsg.as_deref() == Some(nsg))
    }
}

impl RuleSet {
    /// Apply one action in place
    ///
    /// Applying an action that is already in effect succeeds without change.
    /// `StartVm` does not touch rules.
    pub fn apply(&mut self, action: &RemediationAction) -> Result<()> {
        match action {
            RemediationAction::StartVm => Ok(()),
            RemediationAction::InsertAllowRule { rule } => {
                if let Some(existing) = self.get(&rule.name) {
                    return if existing == rule {
                        Ok(())
                    } else {
                        Err(NsgError::RuleExists {
                            rule: rule.name.clone(),
                        })
                    };
                }
                self.check_priority_free(rule.direction, rule.priority, &rule.name)?;
                self.security_rules.push(rule.clone());
                Ok(())
            }
            RemediationAction::RaiseRulePriority {
                rule_name,
                new_priority,
                ..
            } => {
                let rule = self.find(rule_name)?;
                if rule.priority == *new_priority {
                    return Ok(());
                }
                self.check_priority_free(rule.direction, *new_priority, rule_name)?;
                if let Some(rule) = self.get_mut(rule_name) {
                    rule.priority = *new_priority;
                }
                Ok(())
            }
            RemediationAction::WidenRuleField {
                rule_name,
                field,
                new_value,
                ..
            } => {
                let current = self.find(rule_name)?;
                let mut updated = current.clone();
                updated.set_field(*field, new_value)?;
                if updated.direction != current.direction {
                    self.check_priority_free(updated.direction, updated.priority, rule_name)?;
                }
                if let Some(rule) = self.get_mut(rule_name) {
                    *rule = updated;
                }
                Ok(())
            }
        }
    }

    fn find(&self, name: &str) -> Result<&SecurityRule> {
        self.get(name).ok_or_else(|| NsgError::RuleNotFound {
            rule: name.to_string(),
        })
    }

    fn check_priority_free(&self, direction: Direction, priority: u16, name: &str) -> Result<()> {
        match self
            .security_rules
            .iter()
            .find(|r| r.direction == direction && r.priority == priority && r.name != name)
        {
            Some(other) => Err(ValidationError::DuplicatePriority {
                direction,
                priority,
                first: other.name.clone(),
                second: name.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}
