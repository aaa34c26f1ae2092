//! Remediation planner
//!
//! The planner works on a copy of each rule set. It repeatedly evaluates the
//! copy, picks the single change that addresses the current blocker, and
//! applies it, until the traffic is allowed. Each change is the least
//! invasive one available:
//!
//! 1. an allow rule that already matches but sits behind a deny is moved
//!    just ahead of that deny;
//! 2. otherwise the closest RDP-related allow rule has exactly its
//!    mismatched fields widened; fields other than the destination port are
//!    only widened on a rule that admits no port but the target one;
//! 3. otherwise a new allow rule is inserted just ahead of the blocking deny.
//!
//! Rules are never deleted, disabled, or flipped from allow to deny.

use super::action::{FieldValue, PlanStep, RemediationAction, RemediationPlan};
use super::priority::{free_priority_below, free_priority_near};
use crate::error::{NsgError, Result};
use crate::filter::evaluator::blocking_denies;
use crate::filter::{evaluate, NsgLayer, ReachabilityVerdict, RuleMatcher};
use crate::rule::{
    Access, AddressSpec, Direction, Endpoint, PortQuery, PortSpec, PowerState, RuleField,
    RuleSet, SecurityRule, TrafficDescriptor,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Upper bound on evaluate-and-fix rounds per rule set
const MAX_ROUNDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerOptions {
    /// Priority for a new rule when no deny blocks the traffic
    pub default_priority: u16,
    /// Lowest priority value the planner may assign
    pub priority_floor: u16,
    /// Highest priority value the planner may assign
    pub priority_ceiling: u16,
    /// Whether inserting a new allow rule is permitted
    pub allow_new_rules: bool,
    /// Name for an inserted rule; suffixed `-2`, `-3`, ... when taken
    pub rule_name: String,
    /// Case-insensitive name/description fragments that mark a rule as
    /// meant for this traffic
    pub relevance_keywords: Vec<String>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            default_priority: 1000,
            priority_floor: 1,
            priority_ceiling: 4096,
            allow_new_rules: true,
            rule_name: "AllowRDP".to_string(),
            relevance_keywords: vec![
                "rdp".to_string(),
                "remote-desktop".to_string(),
                "3389".to_string(),
            ],
        }
    }
}

pub struct Planner {
    traffic: TrafficDescriptor,
    options: PlannerOptions,
}

impl Planner {
    pub fn new(traffic: TrafficDescriptor, options: PlannerOptions) -> Self {
        Self { traffic, options }
    }

    pub fn traffic(&self) -> &TrafficDescriptor {
        &self.traffic
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Plan for a VM in `power` state guarded by `layers`
    ///
    /// Starting the VM comes first; the rule changes of each layer follow in
    /// layer order. Layers that already allow the traffic add nothing.
    pub fn plan(&self, power: PowerState, layers: &[NsgLayer]) -> Result<RemediationPlan> {
        let mut steps = Vec::new();

        if !power.is_running() {
            steps.push(PlanStep {
                nsg: None,
                action: RemediationAction::StartVm,
                justification: format!("VM is {}; it must be running to accept connections", power),
            });
        }

        for layer in layers {
            steps.extend(self.plan_rule_set(&layer.rule_set)?);
        }

        info!(steps = steps.len(), "remediation plan ready");
        Ok(RemediationPlan { steps })
    }

    /// Plan the rule changes for a single security group
    pub fn plan_rule_set(&self, rule_set: &RuleSet) -> Result<Vec<PlanStep>> {
        let mut working = rule_set.clone();
        let mut steps: Vec<PlanStep> = Vec::new();

        for round in 0..MAX_ROUNDS {
            let verdict = evaluate(&working, &self.traffic)?;
            if verdict.is_allowed() {
                debug!(nsg = %working.name, round, "traffic allowed");
                return Ok(steps);
            }

            for step in self.next_steps(&working, &verdict)? {
                if steps.iter().any(|s| s.action == step.action) {
                    return Err(self.unresolvable(&working));
                }
                debug!(nsg = %working.name, round, action = %step.action, "planned step");
                working.apply(&step.action)?;
                steps.push(step);
            }
        }

        let verdict = evaluate(&working, &self.traffic)?;
        if verdict.is_allowed() {
            Ok(steps)
        } else {
            Err(self.unresolvable(&working))
        }
    }

    fn next_steps(&self, rule_set: &RuleSet, verdict: &ReachabilityVerdict) -> Result<Vec<PlanStep>> {
        let blocker = verdict.deciding_rule.as_ref();

        if let (Some(blocker), Some(shadowed)) = (blocker, verdict.shadowed_allows.first()) {
            return Ok(vec![self.raise_above(rule_set, shadowed, blocker)?]);
        }

        if let Some((candidate, mismatches)) = self.candidate(rule_set) {
            return self.widen(rule_set, candidate, &mismatches);
        }

        if !self.options.allow_new_rules {
            return Err(self.unresolvable(rule_set));
        }

        Ok(vec![self.insert(rule_set, blocker)?])
    }

    /// Move `rule` to the nearest free slot ahead of `blocker`
    fn raise_above(
        &self,
        rule_set: &RuleSet,
        rule: &SecurityRule,
        blocker: &SecurityRule,
    ) -> Result<PlanStep> {
        let taken = rule_set.priorities(rule.direction);
        let new_priority = free_priority_below(&taken, blocker.priority, self.options.priority_floor)
            .ok_or_else(|| NsgError::NoAvailablePriority {
                rule: rule.name.clone(),
                below: blocker.priority,
            })?;

        Ok(PlanStep {
            nsg: Some(rule_set.name.clone()),
            action: RemediationAction::RaiseRulePriority {
                rule_name: rule.name.clone(),
                old_priority: rule.priority,
                new_priority,
            },
            justification: format!(
                "{} already admits {} but is shadowed by {} (priority {})",
                rule.name, self.traffic, blocker.name, blocker.priority
            ),
        })
    }

    /// Widen exactly the fields of `rule` that keep it from matching
    fn widen(
        &self,
        rule_set: &RuleSet,
        rule: &SecurityRule,
        mismatches: &[RuleField],
    ) -> Result<Vec<PlanStep>> {
        let mut steps = Vec::new();

        if mismatches.contains(&RuleField::Direction)
            && rule_set
                .priorities(self.traffic.direction)
                .contains(&rule.priority)
        {
            let mut taken = rule_set.priorities(rule.direction);
            taken.extend(rule_set.priorities(self.traffic.direction));
            let new_priority = free_priority_near(
                &taken,
                rule.priority,
                self.options.priority_floor,
                self.options.priority_ceiling,
            )
            .ok_or_else(|| NsgError::NoAvailablePriority {
                rule: rule.name.clone(),
                below: rule.priority,
            })?;

            steps.push(PlanStep {
                nsg: Some(rule_set.name.clone()),
                action: RemediationAction::RaiseRulePriority {
                    rule_name: rule.name.clone(),
                    old_priority: rule.priority,
                    new_priority,
                },
                justification: format!(
                    "priority {} is already used by an {} rule",
                    rule.priority, self.traffic.direction
                ),
            });
        }

        for &field in mismatches {
            let old_value = FieldValue::of(rule, field);
            let new_value = self.admitting_value(rule, field);
            steps.push(PlanStep {
                nsg: Some(rule_set.name.clone()),
                justification: format!(
                    "{} of {} is {}, which does not admit {}",
                    field, rule.name, old_value, self.traffic
                ),
                action: RemediationAction::WidenRuleField {
                    rule_name: rule.name.clone(),
                    field,
                    old_value,
                    new_value,
                },
            });
        }

        Ok(steps)
    }

    /// Smallest change to `field` of `rule` that admits the traffic
    fn admitting_value(&self, rule: &SecurityRule, field: RuleField) -> FieldValue {
        let traffic = &self.traffic;
        match field {
            RuleField::Direction => FieldValue::Direction(traffic.direction),
            RuleField::Protocol => FieldValue::Protocol(traffic.protocol),
            RuleField::SourceAddressPrefix => {
                FieldValue::Addresses(rule.source_address_prefix.admitting(traffic.source))
            }
            RuleField::SourcePortRange => FieldValue::Ports(match traffic.source_port {
                PortQuery::Any => PortSpec::any(),
                PortQuery::Port(port) => rule.source_port_range.with_port(port),
            }),
            RuleField::DestinationAddressPrefix => FieldValue::Addresses(
                rule.destination_address_prefix.admitting(traffic.destination),
            ),
            RuleField::DestinationPortRange => {
                FieldValue::Ports(rule.destination_port_range.with_port(traffic.destination_port))
            }
        }
    }

    /// New allow rule placed just ahead of the blocking deny
    fn insert(&self, rule_set: &RuleSet, blocker: Option<&SecurityRule>) -> Result<PlanStep> {
        let name = self.free_rule_name(rule_set);
        let taken = rule_set.priorities(self.traffic.direction);
        let floor = self.options.priority_floor;

        let (priority, justification) = match blocker {
            Some(blocker) => {
                let priority = free_priority_below(&taken, blocker.priority, floor).ok_or_else(
                    || NsgError::NoAvailablePriority {
                        rule: name.clone(),
                        below: blocker.priority,
                    },
                )?;
                let reason = format!(
                    "no allow rule admits {}; {} (priority {}) denies it",
                    self.traffic, blocker.name, blocker.priority
                );
                (priority, reason)
            }
            None => {
                let priority = free_priority_near(
                    &taken,
                    self.options.default_priority,
                    floor,
                    self.options.priority_ceiling,
                )
                .ok_or_else(|| NsgError::NoAvailablePriority {
                    rule: name.clone(),
                    below: self.options.priority_ceiling,
                })?;
                let reason = format!(
                    "no rule admits {}; the implicit default deny applies",
                    self.traffic
                );
                (priority, reason)
            }
        };

        let rule = SecurityRule::new(name, priority, self.traffic.direction, Access::Allow)
            .with_protocol(self.traffic.protocol)
            .with_source_addresses(address_for(self.traffic.source))
            .with_destination_addresses(address_for(self.traffic.destination))
            .with_destination_ports(PortSpec::single(self.traffic.destination_port))
            .with_description("Allow RDP added by enable-rdp");

        Ok(PlanStep {
            nsg: Some(rule_set.name.clone()),
            action: RemediationAction::InsertAllowRule { rule },
            justification,
        })
    }

    fn free_rule_name(&self, rule_set: &RuleSet) -> String {
        let base = &self.options.rule_name;
        if rule_set.get(base).is_none() {
            return base.clone();
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|name| rule_set.get(name).is_none())
            .unwrap_or_else(|| base.clone())
    }

    /// The allow rule closest to admitting the traffic, if any is meant for it
    ///
    /// Ties are broken by fewest mismatched fields, then priority, then name.
    fn candidate<'r>(&self, rule_set: &'r RuleSet) -> Option<(&'r SecurityRule, Vec<RuleField>)> {
        let matcher = RuleMatcher::new(&self.traffic);
        rule_set
            .security_rules
            .iter()
            .filter(|r| r.access == Access::Allow && self.is_relevant(r))
            .map(|r| (r, matcher.mismatches(r)))
            .filter(|(_, mismatches)| !mismatches.is_empty())
            .filter(|(r, mismatches)| self.widening_is_contained(r, mismatches))
            .min_by(|(a, ma), (b, mb)| {
                ma.len()
                    .cmp(&mb.len())
                    .then(a.priority.cmp(&b.priority))
                    .then_with(|| a.name.cmp(&b.name))
            })
    }

    /// Whether an allow rule is meant for the traffic being fixed
    ///
    /// Either its destination ports name the target port explicitly, or its
    /// name or description mentions one of the relevance keywords.
    fn is_relevant(&self, rule: &SecurityRule) -> bool {
        let ports = &rule.destination_port_range;
        if !ports.is_any() && ports.matches(PortQuery::Port(self.traffic.destination_port)) {
            return true;
        }

        let name = rule.name.to_lowercase();
        let description = rule.description.as_deref().unwrap_or_default().to_lowercase();
        self.options.relevance_keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            !keyword.is_empty() && (name.contains(&keyword) || description.contains(&keyword))
        })
    }

    /// Whether widening `mismatches` on `rule` changes only the target traffic
    ///
    /// Adding the target port touches no other port. Any other field is shared
    /// by every port the rule covers, so it may only change when the rule
    /// admits the target port and nothing else.
    fn widening_is_contained(&self, rule: &SecurityRule, mismatches: &[RuleField]) -> bool {
        let contained = mismatches
            .iter()
            .all(|&f| f == RuleField::DestinationPortRange)
            || rule
                .destination_port_range
                .admits_only(self.traffic.destination_port);
        if !contained {
            debug!(
                rule = %rule.name,
                ports = %rule.destination_port_range,
                "not widened; it covers other ports"
            );
        }
        contained
    }

    /// Error naming every deny that still matches, or the default deny
    fn unresolvable(&self, rule_set: &RuleSet) -> NsgError {
        let mut blocking: Vec<String> = blocking_denies(rule_set, &self.traffic, u16::MAX)
            .into_iter()
            .map(|r| r.name.clone())
            .collect();
        if blocking.is_empty() {
            blocking.push(match self.traffic.direction {
                Direction::Inbound => "DenyAllInBound (default)".to_string(),
                Direction::Outbound => "DenyAllOutBound (default)".to_string(),
            });
        }
        NsgError::UnresolvableConflict {
            nsg: rule_set.name.clone(),
            blocking,
        }
    }
}

fn address_for(endpoint: Endpoint) -> AddressSpec {
    match endpoint {
        Endpoint::Any => AddressSpec::any(),
        Endpoint::Ip(ip) => AddressSpec::host(ip),
    }
}
