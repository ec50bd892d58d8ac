use crate::error::{ConfigError, ConfigResult};
use crate::settings::{LogSettings, TreeSettings};
use crate::toml_parser::{TomlParser, TomlTable, TomlValue};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Sections owned by typed settings; everything else lands in `custom`
const KNOWN_SECTIONS: [&str; 2] = ["tree.", "log."];

/// Main configuration structure for rbt
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Tree engine and driver settings
    pub tree: TreeSettings,
    /// Logging settings
    pub log: LogSettings,
    /// Custom configuration values
    pub custom: HashMap<String, TomlValue>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let values = TomlParser::parse(content)?;
        Self::check_known_keys(&values)?;

        let config = Self {
            tree: TreeSettings::from_toml(&values)?,
            log: LogSettings::from_toml(&values)?,
            custom: values
                .into_iter()
                .filter(|(k, _)| !KNOWN_SECTIONS.iter().any(|s| k.starts_with(s)))
                .collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Keys under `[tree]` and `[log]` must be ones the settings read
    fn check_known_keys(values: &TomlTable) -> ConfigResult<()> {
        let mut unknown: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|k| KNOWN_SECTIONS.iter().any(|s| k.starts_with(s)))
            .filter(|k| {
                !TreeSettings::KEYS
                    .iter()
                    .chain(LogSettings::KEYS.iter())
                    .any(|known| known == k)
            })
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(ConfigError::Validation(format!(
            "Unknown configuration key(s): {}",
            unknown.join(", ")
        )))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        fs::write(path, self.to_toml_string())?;
        Ok(())
    }

    /// Export configuration as TOML string
    pub fn to_toml_string(&self) -> String {
        let mut all_values = TomlTable::new();
        all_values.extend(self.tree.to_toml());
        all_values.extend(self.log.to_toml());
        all_values.extend(self.custom.clone());

        Self::format_toml(&all_values)
    }

    /// Group dotted keys into sections, sorted so the output is stable
    fn format_toml(values: &TomlTable) -> String {
        let mut sections: BTreeMap<&str, BTreeMap<&str, &TomlValue>> = BTreeMap::new();
        for (key, value) in values {
            let (section, name) = key.split_once('.').unwrap_or(("", key.as_str()));
            sections.entry(section).or_default().insert(name, value);
        }

        let mut output = String::new();

        // Root level values must come before any header
        if let Some(root_values) = sections.remove("") {
            for (key, value) in root_values {
                output.push_str(&format!("{} = {}\n", key, value.to_toml_literal()));
            }
        }

        for (section, section_values) in sections {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&format!("[{}]\n", section));
            for (key, value) in section_values {
                output.push_str(&format!("{} = {}\n", key, value.to_toml_literal()));
            }
        }

        output
    }

    /// Get configuration file search paths
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Current directory first so a project file wins
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join("rbt.toml"));
        }

        // User-specific config
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(&home).join(".rbt.toml"));
            paths.push(PathBuf::from(&home).join(".config").join("rbt").join("config.toml"));
        }

        paths
    }

    /// Load configuration with automatic path discovery
    pub fn load() -> ConfigResult<Self> {
        Self::load_with_paths(&Self::config_paths())
    }

    /// Load the first existing file among `paths`, or defaults if none exist
    pub fn load_with_paths(paths: &[PathBuf]) -> ConfigResult<Self> {
        for path in paths {
            if path.exists() {
                debug!("loading configuration from {}", path.display());
                return Self::from_file(path);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Get a custom configuration value
    pub fn get_custom(&self, key: &str) -> Option<&TomlValue> {
        self.custom.get(key)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tree.dump_limit == 0 {
            return Err(ConfigError::Validation(
                "tree.dump_limit must be greater than 0".to_string(),
            ));
        }
        if self.tree.initial_capacity == u32::MAX {
            return Err(ConfigError::Validation(
                "tree.initial_capacity exceeds the node id space".to_string(),
            ));
        }
        Ok(())
    }
}
