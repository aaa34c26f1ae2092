//! Configuration system for enable-rdp
//!
//! - `schema`: the configuration document and its sections
//! - `loader`: layered loading (built-in < user < project < explicit)
//! - `builtin`: defaults embedded in the binary

pub mod builtin;
pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{CommonConfig, Config, InventoryConfig, OutputFormat, TrafficConfig};
