//! Rule model: security rules, rule sets and the traffic being queried

pub mod address;
pub mod model;
pub mod port;
pub mod power;
pub mod traffic;

pub use address::{AddressPrefix, AddressSpec};
pub use model::{Access, Direction, Protocol, RuleField, RuleSet, SecurityRule};
pub use port::{PortRange, PortSpec};
pub use power::PowerState;
pub use traffic::{Endpoint, PortQuery, TrafficDescriptor, RDP_PORT};

use serde::{Deserialize, Serialize};

/// Raw form of a multi-valued rule field: Azure accepts either a single
/// string (`"3389"`) or a list (`["3389", "5000-5100"]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    /// Flatten into individual entries, splitting comma-separated strings
    pub fn into_entries(self) -> Vec<String> {
        let items = match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        };
        items
            .iter()
            .flat_map(|s| s.split(','))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn from_entries(mut entries: Vec<String>) -> Self {
        if entries.len() == 1 {
            OneOrMany::One(entries.remove(0))
        } else {
            OneOrMany::Many(entries)
        }
    }
}
