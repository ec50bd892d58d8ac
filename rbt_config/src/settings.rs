use crate::error::{ConfigError, ConfigResult};
use crate::toml_parser::{TomlTable, TomlValue};
use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;

/// Tree engine and driver settings (`[tree]`)
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSettings {
    /// Node slots reserved when a tree is created
    pub initial_capacity: u32,
    /// Run the full invariant check after every mutation
    pub validate_each_step: bool,
    /// Default number of keys printed by `dump`
    pub dump_limit: u32,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            validate_each_step: false,
            dump_limit: 64,
        }
    }
}

impl TreeSettings {
    /// Keys read from the `[tree]` section
    pub const KEYS: [&'static str; 3] = [
        "tree.initial_capacity",
        "tree.validate_each_step",
        "tree.dump_limit",
    ];

    /// Load settings from TOML values
    pub fn from_toml(values: &TomlTable) -> ConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(value) = values.get("tree.initial_capacity") {
            settings.initial_capacity = value.as_u32()?;
        }
        if let Some(value) = values.get("tree.validate_each_step") {
            settings.validate_each_step = value.as_bool()?;
        }
        if let Some(value) = values.get("tree.dump_limit") {
            settings.dump_limit = value.as_u32()?;
        }

        Ok(settings)
    }

    /// Export settings to TOML format
    pub fn to_toml(&self) -> TomlTable {
        let mut values = HashMap::new();
        values.insert(
            "tree.initial_capacity".to_string(),
            TomlValue::Integer(i64::from(self.initial_capacity)),
        );
        values.insert(
            "tree.validate_each_step".to_string(),
            TomlValue::Bool(self.validate_each_step),
        );
        values.insert(
            "tree.dump_limit".to_string(),
            TomlValue::Integer(i64::from(self.dump_limit)),
        );
        values
    }
}

/// Logging settings (`[log]`)
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Maximum level written to the terminal
    pub level: LevelFilter,
    /// Optional log file receiving everything down to `debug`
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file: None,
        }
    }
}

impl LogSettings {
    /// Keys read from the `[log]` section
    pub const KEYS: [&'static str; 2] = ["log.level", "log.file"];

    pub fn from_toml(values: &TomlTable) -> ConfigResult<Self> {
        let mut settings = Self::default();
        if let Some(value) = values.get("log.level") {
            settings.level = parse_level(value.as_string()?)?;
        }
        if let Some(value) = values.get("log.file") {
            let path = value.as_string()?;
            if path.is_empty() {
                return Err(ConfigError::Validation("log.file must not be empty".to_string()));
            }
            settings.file = Some(PathBuf::from(path));
        }
        Ok(settings)
    }

    pub fn to_toml(&self) -> TomlTable {
        let mut values = HashMap::new();
        values.insert(
            "log.level".to_string(),
            TomlValue::String(self.level.as_str().to_ascii_lowercase()),
        );
        if let Some(file) = &self.file {
            values.insert(
                "log.file".to_string(),
                TomlValue::String(file.to_string_lossy().into_owned()),
            );
        }
        values
    }
}

/// Parse a level name (`off`, `error`, `warn`, `info`, `debug`, `trace`)
pub fn parse_level(name: &str) -> ConfigResult<LevelFilter> {
    name.parse::<LevelFilter>()
        .map_err(|_| ConfigError::Validation(format!("Unknown log level '{}'", name)))
}
