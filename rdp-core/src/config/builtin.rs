//! Built-in default configuration embedded in the binary
//!
//! The built-in layer is parsed once on first access and cached. It is kept
//! both as a raw table (the base that other layers merge into) and as a
//! typed `Config`.

use super::schema::Config;
use std::sync::LazyLock;

const BUILTIN_TOML: &str = include_str!("../builtin-config.toml");

static BUILTIN_TABLE: LazyLock<toml::Table> = LazyLock::new(|| {
    BUILTIN_TOML
        .parse()
        .expect("Failed to parse builtin configuration")
});

static BUILTIN_CONFIG: LazyLock<Config> = LazyLock::new(|| {
    toml::Value::Table(get_builtin_table().clone())
        .try_into()
        .expect("Builtin configuration does not match the schema")
});

/// Get the builtin configuration
pub fn get_builtin() -> &'static Config {
    &BUILTIN_CONFIG
}

/// Get the builtin configuration as an untyped table
pub fn get_builtin_table() -> &'static toml::Table {
    &BUILTIN_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_loads() {
        let config = get_builtin();
        assert_eq!(config.common.config_version, "1.0");
        assert_eq!(config.traffic.destination_port, 3389);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builtin_cached() {
        let config1 = get_builtin();
        let config2 = get_builtin();
        assert_eq!(config1 as *const _, config2 as *const _);
    }

    #[test]
    fn test_builtin_uses_platform_priority_range() {
        let planner = &get_builtin().planner;
        assert_eq!(planner.priority_floor, 100);
        assert_eq!(planner.priority_ceiling, 4096);
        assert_eq!(planner.default_priority, 1000);
        assert_eq!(planner.rule_name, "AllowRDP");
    }
}
