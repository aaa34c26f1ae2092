//! Configuration file loading and merging

use super::builtin;
use super::schema::Config;
use crate::error::{AppError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Project-level config file name, searched for up the directory tree
pub const PROJECT_CONFIG: &str = ".enable-rdp.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Find user config by checking environment and standard locations
    pub fn find_user_config() -> Option<PathBuf> {
        // 1. $ENABLE_RDP_CONFIG
        if let Ok(path) = env::var("ENABLE_RDP_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        // 2. $XDG_CONFIG_HOME/enable-rdp/config.toml
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            let p = PathBuf::from(xdg).join("enable-rdp/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        // 3. ~/.config/enable-rdp/config.toml
        if let Ok(home) = env::var("HOME") {
            let p = PathBuf::from(home).join(".config/enable-rdp/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    /// Find project config by searching up from the current directory
    pub fn find_project_config() -> Option<PathBuf> {
        Self::find_project_config_from(&env::current_dir().ok()?)
    }

    /// Find project config by searching up from `start`
    pub fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            let project_config = current.join(PROJECT_CONFIG);
            if project_config.exists() {
                return Some(project_config);
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Read one layer as a raw table, checking it against the schema
    pub fn read_layer<P: AsRef<Path>>(path: P) -> Result<toml::Table> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| AppError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let table: toml::Table = contents.parse().map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        // Report unknown keys against the file that contains them
        Self::into_config(table.clone()).map_err(|source| AppError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(table)
    }

    /// Load a single file on top of the built-in defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        Self::load_layers(&[path.as_ref().to_path_buf()])
    }

    /// Load built-in configuration embedded in the binary
    pub fn load_builtin() -> Config {
        builtin::get_builtin().clone()
    }

    /// Merge `overlay` into `base`
    ///
    /// Nested tables merge key by key; any other value in `overlay` replaces
    /// the one in `base`.
    pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
        for (key, value) in overlay {
            match (base.get_mut(&key), value) {
                (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                    Self::merge_tables(existing, incoming);
                }
                (_, value) => {
                    base.insert(key, value);
                }
            }
        }
    }

    /// Merge the given files, in order, over the built-in layer
    pub fn load_layers(paths: &[PathBuf]) -> Result<Config> {
        let mut merged = builtin::get_builtin_table().clone();
        for path in paths {
            tracing::debug!("Merging config layer {:?}", path);
            Self::merge_tables(&mut merged, Self::read_layer(path)?);
        }

        let config = Self::into_config(merged)
            .map_err(|e| AppError::ConfigError(format!("merged configuration is invalid: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load with full config priority order
    /// Priority: built-in < user < project < explicit
    pub fn load_with_priority(explicit_config: Option<PathBuf>) -> Result<Config> {
        let mut layers = Vec::new();

        if let Some(user_path) = Self::find_user_config() {
            tracing::debug!("Loading user config from {:?}", user_path);
            layers.push(user_path);
        }

        if let Some(project_path) = Self::find_project_config() {
            tracing::debug!("Loading project config from {:?}", project_path);
            layers.push(project_path);
        }

        if let Some(explicit_path) = explicit_config {
            tracing::debug!("Loading explicit config from {:?}", explicit_path);
            layers.push(explicit_path);
        }

        Self::load_layers(&layers)
    }

    fn into_config(table: toml::Table) -> std::result::Result<Config, toml::de::Error> {
        toml::Value::Table(table).try_into()
    }
}
