//! Application layer for enable-rdp
//!
//! Wires the NSG evaluator and remediation planner to a cloud inventory:
//! inspect the VM, decide reachability, plan, optionally apply, and confirm.

pub mod args;
pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod report;
pub mod session;

pub use args::CommonArgs;
pub use config::{Config, ConfigLoader, OutputFormat};
pub use error::{AppError, Result};
pub use executor::{ExecutionReport, PlanExecutor};
pub use inventory::{CloudInventory, CloudRemediator, NetworkAddresses, SnapshotCloud, VmTarget};
pub use report::ConsoleReport;
pub use session::{Session, SessionReport, SessionState};
