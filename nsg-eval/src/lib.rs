//! Azure network security group evaluation and RDP remediation planning
//!
//! Replicates the platform's NSG semantics (priority order, first match wins,
//! implicit default deny) and computes the smallest non-destructive set of
//! changes that makes a traffic pattern reachable.

pub mod error;
pub mod filter;
pub mod plan;
pub mod rule;

// Re-export commonly used types
pub use error::{NsgError, Result, ValidationError};
pub use filter::{
    evaluate, evaluate_layers, LayerVerdict, LayeredVerdict, NsgLayer, NsgScope, Reachability,
    ReachabilityVerdict, RuleMatcher, RuleSetValidator,
};
pub use plan::{
    FieldValue, PlanStep, Planner, PlannerOptions, RemediationAction, RemediationPlan,
};
pub use rule::{
    Access, AddressPrefix, AddressSpec, Direction, Endpoint, PortQuery, PortRange, PortSpec,
    PowerState, Protocol, RuleField, RuleSet, SecurityRule, TrafficDescriptor, RDP_PORT,
};
