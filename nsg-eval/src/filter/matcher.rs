//! Field-by-field matching of security rules against a traffic descriptor

use crate::rule::{
    AddressSpec, Endpoint, PortQuery, PortSpec, Protocol, RuleField, SecurityRule,
    TrafficDescriptor,
};

/// Protocol predicate: exact match or a `*` rule
pub fn protocol_matches(rule: Protocol, query: Protocol) -> bool {
    rule.covers(query)
}

/// Port predicate: the field must admit the queried port
pub fn port_matches(spec: &PortSpec, query: PortQuery) -> bool {
    spec.matches(query)
}

/// Address predicate: the field must admit the queried endpoint
pub fn address_matches(spec: &AddressSpec, query: Endpoint) -> bool {
    spec.matches(query)
}

/// Matcher for security rules against one traffic descriptor
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher<'a> {
    traffic: &'a TrafficDescriptor,
}

impl<'a> RuleMatcher<'a> {
    pub fn new(traffic: &'a TrafficDescriptor) -> Self {
        Self { traffic }
    }

    pub fn traffic(&self) -> &TrafficDescriptor {
        self.traffic
    }

    /// Check the five match predicates, ignoring direction
    ///
    /// Direction is a filter applied before the walk, not a predicate.
    pub fn matches_fields(&self, rule: &SecurityRule) -> bool {
        protocol_matches(rule.protocol, self.traffic.protocol)
            && port_matches(
                &rule.destination_port_range,
                PortQuery::Port(self.traffic.destination_port),
            )
            && port_matches(&rule.source_port_range, self.traffic.source_port)
            && address_matches(&rule.destination_address_prefix, self.traffic.destination)
            && address_matches(&rule.source_address_prefix, self.traffic.source)
    }

    /// Check direction and all five predicates
    pub fn matches(&self, rule: &SecurityRule) -> bool {
        rule.direction == self.traffic.direction && self.matches_fields(rule)
    }

    /// List the fields that keep `rule` from matching, in a fixed order
    pub fn mismatches(&self, rule: &SecurityRule) -> Vec<RuleField> {
        let mut fields = Vec::new();

        if rule.direction != self.traffic.direction {
            fields.push(RuleField::Direction);
        }
        if !protocol_matches(rule.protocol, self.traffic.protocol) {
            fields.push(RuleField::Protocol);
        }
        if !address_matches(&rule.source_address_prefix, self.traffic.source) {
            fields.push(RuleField::SourceAddressPrefix);
        }
        if !port_matches(&rule.source_port_range, self.traffic.source_port) {
            fields.push(RuleField::SourcePortRange);
        }
        if !address_matches(&rule.destination_address_prefix, self.traffic.destination) {
            fields.push(RuleField::DestinationAddressPrefix);
        }
        if !port_matches(
            &rule.destination_port_range,
            PortQuery::Port(self.traffic.destination_port),
        ) {
            fields.push(RuleField::DestinationPortRange);
        }

        fields
    }
}
