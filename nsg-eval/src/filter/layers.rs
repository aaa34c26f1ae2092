//! Combined verdict across the subnet and network-interface security groups

use super::evaluator::{evaluate, Reachability, ReachabilityVerdict};
use crate::error::Result;
use crate::rule::{RuleSet, TrafficDescriptor};
use serde::Serialize;
use std::fmt;

/// Where a security group is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NsgScope {
    Subnet,
    NetworkInterface,
}

impl fmt::Display for NsgScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NsgScope::Subnet => write!(f, "subnet"),
            NsgScope::NetworkInterface => write!(f, "network interface"),
        }
    }
}

/// One security group on the path to the VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsgLayer {
    pub scope: NsgScope,
    pub rule_set: RuleSet,
}

impl NsgLayer {
    pub fn new(scope: NsgScope, rule_set: RuleSet) -> Self {
        Self { scope, rule_set }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerVerdict {
    pub scope: NsgScope,
    pub nsg: String,
    pub verdict: ReachabilityVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayeredVerdict {
    pub reachability: Reachability,
    pub layers: Vec<LayerVerdict>,
}

impl LayeredVerdict {
    pub fn is_allowed(&self) -> bool {
        self.reachability == Reachability::Allowed
    }

    /// Layers whose own verdict is a deny
    pub fn denying_layers(&self) -> impl Iterator<Item = &LayerVerdict> {
        self.layers.iter().filter(|l| !l.verdict.is_allowed())
    }
}

/// Evaluate every attached security group; traffic passes only if all allow it
///
/// A VM with no security group attached is not filtered at all.
pub fn evaluate_layers(layers: &[NsgLayer], traffic: &TrafficDescriptor) -> Result<LayeredVerdict> {
    let layers = layers
        .iter()
        .map(|layer| {
            Ok(LayerVerdict {
                scope: layer.scope,
                nsg: layer.rule_set.name.clone(),
                verdict: evaluate(&layer.rule_set, traffic)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let reachability = if layers.iter().all(|l| l.verdict.is_allowed()) {
        Reachability::Allowed
    } else {
        Reachability::Denied
    };

    Ok(LayeredVerdict {
        reachability,
        layers,
    })
}
