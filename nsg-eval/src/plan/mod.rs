//! Remediation planning: the smallest non-destructive change that makes
//! traffic reachable

pub mod action;
pub mod planner;
pub mod priority;

pub use action::{FieldValue, PlanStep, RemediationAction, RemediationPlan};
pub use planner::{Planner, PlannerOptions};
pub use priority::{free_priority_below, free_priority_near};
