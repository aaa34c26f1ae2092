//! Error types for rule evaluation and remediation planning

use crate::rule::{Direction, RuleField};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NsgError>;

#[derive(Debug, Error)]
pub enum NsgError {
    #[error("Invalid rule configuration: {0}")]
    InvalidRuleConfiguration(#[from] ValidationError),

    #[error("No available priority below {below} for rule {rule}")]
    NoAvailablePriority { rule: String, below: u16 },

    #[error("Unresolvable conflict in {nsg}: still blocked by {}", .blocking.join(", "))]
    UnresolvableConflict { nsg: String, blocking: Vec<String> },

    #[error("Rule not found: {rule}")]
    RuleNotFound { rule: String },

    #[error("Rule {rule} already exists with different settings")]
    RuleExists { rule: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{direction} rules {first} and {second} share priority {priority}")]
    DuplicatePriority {
        direction: Direction,
        priority: u16,
        first: String,
        second: String,
    },

    #[error("Duplicate rule name: {name}")]
    DuplicateName { name: String },

    #[error("Invalid port range {range} in rule {rule}")]
    InvalidPortRange { rule: String, range: String },

    #[error("Invalid port specification: {spec}")]
    InvalidPortSpec { spec: String },

    #[error("Invalid address prefix: {prefix}")]
    InvalidAddress { prefix: String },

    #[error("Value {value} cannot be assigned to field {field}")]
    FieldValueMismatch { field: RuleField, value: String },
}
