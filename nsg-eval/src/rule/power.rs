//! VM power state as reported by the compute instance view

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    Running,
    Stopped,
    Deallocated,
    Starting,
    Failed,
    Unknown,
}

impl PowerState {
    /// Interpret an instance-view status code (`PowerState/running`), a
    /// display status (`VM running`) or a bare state name
    ///
    /// Transitional stop states map onto the state they settle in.
    pub fn from_status(status: &str) -> Self {
        let lowered = status.trim().to_ascii_lowercase();
        let state = lowered
            .strip_prefix("powerstate/")
            .or_else(|| lowered.strip_prefix("vm "))
            .unwrap_or(lowered.as_str());

        match state {
            "running" => PowerState::Running,
            "stopped" | "stopping" => PowerState::Stopped,
            "deallocated" | "deallocating" => PowerState::Deallocated,
            "starting" => PowerState::Starting,
            "failed" => PowerState::Failed,
            _ => PowerState::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == PowerState::Running
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Running => "running",
            PowerState::Stopped => "stopped",
            PowerState::Deallocated => "deallocated",
            PowerState::Starting => "starting",
            PowerState::Failed => "failed",
            PowerState::Unknown => "unknown",
        }
    }
}

impl FromStr for PowerState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_status(s))
    }
}

impl From<String> for PowerState {
    fn from(s: String) -> Self {
        Self::from_status(&s)
    }
}

impl From<PowerState> for String {
    fn from(state: PowerState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
